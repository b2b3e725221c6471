//! Per-approach and per-tournament outcomes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::Decision;
use super::plan::Plan;

/// One draft/evaluate pass of an agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-indexed attempt number.
    pub attempt: u32,

    pub tests_passed: u32,

    pub tests_failed: u32,

    /// Sequence numbers of the decisions recorded while drafting this attempt.
    pub decisions_made: Vec<u64>,

    /// Messages of failing tests, or a single crash/timeout message.
    pub error_messages: Vec<String>,

    /// Metrics reported by the evaluator for this attempt (empty on crash).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Whether the evaluator signalled overall success.
    #[serde(default)]
    pub evaluator_success: bool,

    /// Candidate source evaluated in this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snapshot: Option<String>,
}

impl Iteration {
    pub fn total_tests(&self) -> u32 {
        self.tests_passed + self.tests_failed
    }

    /// All tests passed and the evaluator agreed.
    pub fn success(&self) -> bool {
        self.evaluator_success && self.tests_failed == 0
    }
}

/// Why an agent loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// The evaluator confirmed success.
    Passed,
    /// The iteration budget ran out without passing.
    IterationBudgetExhausted,
    /// The evaluator crashed identically on two consecutive attempts.
    EvaluatorFailed { message: String },
    /// The tournament timeout fired before the loop finished.
    Cancelled,
    /// The loop never ran: its workspace could not be provisioned or its
    /// task panicked.
    Aborted { message: String },
}

impl Termination {
    /// Everything except `Passed` is recorded as a budget-exhausted marker in
    /// summaries.
    pub fn is_exhausted(&self) -> bool {
        !matches!(self, Termination::Passed)
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Passed => write!(f, "passed"),
            Termination::IterationBudgetExhausted => write!(f, "iteration budget exhausted"),
            Termination::EvaluatorFailed { message } => write!(f, "evaluator failed: {message}"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::Aborted { message } => write!(f, "aborted: {message}"),
        }
    }
}

/// Accumulated outcome of one approach's loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Name of the approach; unique within a tournament.
    pub approach: String,

    /// True iff the last iteration passed every test and the evaluator agreed.
    pub success: bool,

    pub iterations: Vec<Iteration>,

    /// Every decision recorded by this approach, in sequence order.
    pub decision_trail: Vec<Decision>,

    /// Final metric values.
    pub metrics: BTreeMap<String, f64>,

    /// Source of the last candidate produced.
    pub final_code: String,

    /// Weighted score, 0 until the scoring engine runs.
    #[serde(default)]
    pub score: f64,

    pub termination: Termination,

    /// Working location used by this approach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,

    /// Branch reference when the workspace is version controlled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

impl AgentResult {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn decision_count(&self) -> usize {
        self.decision_trail.len()
    }

    pub fn converged(&self) -> bool {
        self.success && !self.iterations.is_empty()
    }

    pub fn final_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    pub fn blocking_decisions(&self) -> impl Iterator<Item = &Decision> {
        self.decision_trail.iter().filter(|d| d.blocking)
    }

    /// Failed result for an approach whose loop never ran.
    pub fn aborted(approach: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            approach: approach.into(),
            success: false,
            iterations: Vec::new(),
            decision_trail: Vec::new(),
            metrics: BTreeMap::new(),
            final_code: String::new(),
            score: 0.0,
            termination: Termination::Aborted {
                message: message.into(),
            },
            workspace: None,
            branch: None,
        }
    }
}

/// Final ranked outcome of a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub tournament_id: Uuid,

    /// Sorted by score descending, ties broken by approach name ascending.
    results: Vec<AgentResult>,

    plan: Plan,

    pub completed_at: DateTime<Utc>,
}

impl TournamentResult {
    /// Rank already-scored results into a tournament outcome.
    pub fn new(plan: Plan, mut results: Vec<AgentResult>) -> Self {
        crate::scoring::rank(&mut results);
        Self {
            tournament_id: Uuid::new_v4(),
            results,
            plan,
            completed_at: Utc::now(),
        }
    }

    pub fn results(&self) -> &[AgentResult] {
        &self.results
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The highest-ranked approach, if any approach ran.
    pub fn winner(&self) -> Option<&AgentResult> {
        self.results.first()
    }

    /// Approach names in rank order.
    pub fn approaches(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.approach.as_str()).collect()
    }

    pub fn get_result(&self, approach: &str) -> Option<&AgentResult> {
        self.results.iter().find(|r| r.approach == approach)
    }

    pub fn top_n(&self, n: usize) -> &[AgentResult] {
        &self.results[..n.min(self.results.len())]
    }
}
