//! Scripted capabilities shared by the tournament tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentfleet_core::capability::CapabilityResult;
use agentfleet_core::workspace::WorkspaceResult;
use agentfleet_core::{
    CapabilityError, EvaluationReport, Evaluator, Implementer, ImplementerOutput,
    ImplementerRequest, Plan, PlanFields, TestOutcome, TestSpec, Workspace, WorkspaceError,
    WorkspaceProvider,
};
use async_trait::async_trait;

/// 60/25/15 plan with one test per category.
pub fn plan() -> Plan {
    Plan::new(PlanFields {
        resolved_task: "Implement a per-user rate limiter".to_string(),
        interface_contract: "class RateLimiter:\n    def allow(self, user_id: str) -> bool".to_string(),
        tests: vec![
            TestSpec::new("test_allows_under_limit", "correctness"),
            TestSpec::new("test_short", "simplicity"),
            TestSpec::new("test_fast", "performance"),
        ],
        metrics: ["correctness_score", "simplicity_score", "performance_score"]
            .into_iter()
            .map(String::from)
            .collect(),
        weights: [
            ("correctness".to_string(), 60.0),
            ("simplicity".to_string(), 25.0),
            ("performance".to_string(), 15.0),
        ]
        .into_iter()
        .collect(),
        evaluator_spec: serde_json::Value::Null,
    })
    .unwrap()
}

pub fn names(approaches: &[&str]) -> Vec<String> {
    approaches.iter().map(|a| a.to_string()).collect()
}

/// Tagged annotation text.
pub fn annotation(question: &str, options: &[&str], chosen: &str, blocking: bool) -> String {
    format!(
        "DECISION: {question}\nOPTIONS: [{}]\nCHOSEN: {chosen}\nREASONING: fits the contract\nBLOCKING: {}",
        options.join(", "),
        if blocking { "yes" } else { "no" }
    )
}

// ---------------------------------------------------------------------------
// Implementer
// ---------------------------------------------------------------------------

/// What the scripted implementer does on a given attempt.
#[derive(Clone)]
pub enum Step {
    Draft(ImplementerOutput),
    Fail(CapabilityError),
    /// Never answers.
    Hang,
}

pub fn draft(source: &str, annotations: Vec<String>) -> Step {
    Step::Draft(ImplementerOutput {
        candidate_source: source.to_string(),
        annotations,
    })
}

/// Snapshot of one implementer call.
#[derive(Debug, Clone)]
pub struct Call {
    pub approach: String,
    pub attempt: u32,
    pub feedback: Vec<String>,
}

/// Replays a per-approach list of steps; the last step repeats.
#[derive(Default)]
pub struct ScriptedImplementer {
    scripts: HashMap<String, Vec<Step>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedImplementer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, approach: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(approach.to_string(), steps);
        self
    }

    pub fn calls_for(&self, approach: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.approach == approach)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Implementer for ScriptedImplementer {
    async fn implement(&self, request: ImplementerRequest<'_>) -> CapabilityResult<ImplementerOutput> {
        self.calls.lock().unwrap().push(Call {
            approach: request.approach.to_string(),
            attempt: request.attempt,
            feedback: request.feedback.to_vec(),
        });

        let step = self
            .scripts
            .get(request.approach)
            .and_then(|steps| {
                let index = (request.attempt as usize - 1).min(steps.len().saturating_sub(1));
                steps.get(index).cloned()
            })
            .unwrap_or_else(|| draft(&format!("# {}", request.approach), vec![]));

        match step {
            Step::Draft(output) => Ok(output),
            Step::Fail(err) => Err(err),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CapabilityError::ImplementerFailed("woke up".to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

type Judge = dyn Fn(&str, &str) -> CapabilityResult<EvaluationReport> + Send + Sync;

/// Judges `(approach, candidate_source)` with a closure.
pub struct ScriptedEvaluator {
    judge: Box<Judge>,
}

impl ScriptedEvaluator {
    pub fn new(
        judge: impl Fn(&str, &str) -> CapabilityResult<EvaluationReport> + Send + Sync + 'static,
    ) -> Self {
        Self {
            judge: Box::new(judge),
        }
    }

    /// Passes every candidate with the given metrics.
    pub fn always_pass(metrics: &[(&str, f64)]) -> Self {
        let metrics = metric_map(metrics);
        Self::new(move |_, _| Ok(report(&[("test_allows_under_limit", true)], &metrics)))
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _plan: &Plan,
        candidate_source: &str,
        workspace: &Workspace,
    ) -> CapabilityResult<EvaluationReport> {
        (self.judge)(&workspace.approach, candidate_source)
    }
}

pub fn metric_map(metrics: &[(&str, f64)]) -> BTreeMap<String, f64> {
    metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Report with the given per-test outcomes. `success` is true when every test
/// passed.
pub fn report(tests: &[(&str, bool)], metrics: &BTreeMap<String, f64>) -> EvaluationReport {
    EvaluationReport {
        success: tests.iter().all(|(_, pass)| *pass),
        tests: tests
            .iter()
            .map(|(name, pass)| {
                let outcome = TestOutcome {
                    pass: *pass,
                    category: "correctness".to_string(),
                    message: if *pass { String::new() } else { "off by one".to_string() },
                };
                (name.to_string(), outcome)
            })
            .collect(),
        metrics: metrics.clone(),
    }
}

pub const METRICS: &[(&str, f64)] = &[
    ("correctness_score", 0.8),
    ("simplicity_score", 0.9),
    ("performance_score", 0.7),
];

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

/// Hands out paths without touching the filesystem; fails for listed
/// approaches.
#[derive(Default)]
pub struct VirtualWorkspaces {
    broken: Vec<String>,
}

impl VirtualWorkspaces {
    pub fn failing_for(approaches: &[&str]) -> Self {
        Self {
            broken: names(approaches),
        }
    }
}

#[async_trait]
impl WorkspaceProvider for VirtualWorkspaces {
    async fn provision(&self, approach: &str) -> WorkspaceResult<Workspace> {
        if self.broken.iter().any(|b| b == approach) {
            return Err(WorkspaceError::Git(format!("cannot branch for {approach}")));
        }
        Ok(Workspace {
            approach: approach.to_string(),
            path: std::env::temp_dir().join("agentfleet-virtual").join(approach),
            branch: None,
        })
    }
}

pub fn virtual_workspaces() -> Arc<VirtualWorkspaces> {
    Arc::new(VirtualWorkspaces::default())
}
