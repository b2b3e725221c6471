//! Contracts for the external capabilities an agent loop drives.
//!
//! The loop never generates or judges source itself: it asks an
//! [`Implementer`] for a candidate and an [`Evaluator`] for a structured
//! verdict. Both are async traits so production adapters (subprocesses, model
//! APIs) and deterministic test stubs plug in the same way.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Iteration, Plan};
use crate::workspace::Workspace;

/// Failures surfaced by external capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("implementer timed out after {timeout_secs}s")]
    ImplementerTimeout { timeout_secs: u64 },

    #[error("implementer failed: {0}")]
    ImplementerFailed(String),

    #[error("evaluator crashed: {0}")]
    EvaluatorCrash(String),

    #[error("evaluator produced malformed output: {0}")]
    MalformedEvaluatorOutput(String),
}

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

// ---------------------------------------------------------------------------
// Implementer
// ---------------------------------------------------------------------------

/// Everything an implementer sees when drafting one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ImplementerRequest<'a> {
    pub plan: &'a Plan,
    pub approach: &'a str,
    /// 1-indexed attempt being drafted.
    pub attempt: u32,
    pub max_iterations: u32,
    pub prior_iterations: &'a [Iteration],
    /// Failing test messages from the previous attempt (empty on attempt 1).
    pub feedback: &'a [String],
    pub workspace: &'a Workspace,
}

/// Candidate source plus free-text interpretive notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementerOutput {
    pub candidate_source: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// Proposes candidate source for an approach.
#[async_trait]
pub trait Implementer: Send + Sync {
    async fn implement(&self, request: ImplementerRequest<'_>) -> CapabilityResult<ImplementerOutput>;
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Outcome of one hidden test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub pass: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
}

/// Structured verdict returned by an evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub success: bool,
    #[serde(default)]
    pub tests: BTreeMap<String, TestOutcome>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl EvaluationReport {
    pub fn tests_passed(&self) -> u32 {
        self.tests.values().filter(|t| t.pass).count() as u32
    }

    pub fn tests_failed(&self) -> u32 {
        self.tests.values().filter(|t| !t.pass).count() as u32
    }

    /// `name: message` for every failing test, in test-name order.
    pub fn failure_messages(&self) -> Vec<String> {
        self.tests
            .iter()
            .filter(|(_, t)| !t.pass)
            .map(|(name, t)| {
                let message = if t.message.is_empty() { "Failed" } else { &t.message };
                format!("{name}: {message}")
            })
            .collect()
    }

    /// The evaluator signalled success and no test failed.
    pub fn passed(&self) -> bool {
        self.success && self.tests_failed() == 0
    }
}

/// Runs a candidate against the plan's hidden tests.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        plan: &Plan,
        candidate_source: &str,
        workspace: &Workspace,
    ) -> CapabilityResult<EvaluationReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(pass: bool, message: &str) -> TestOutcome {
        TestOutcome {
            pass,
            category: "correctness".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_report_counts_and_messages() {
        let report = EvaluationReport {
            success: false,
            tests: [
                ("test_basic".to_string(), outcome(true, "")),
                ("test_burst".to_string(), outcome(false, "allowed 11 of 10")),
                ("test_reset".to_string(), outcome(false, "")),
            ]
            .into_iter()
            .collect(),
            metrics: BTreeMap::new(),
        };

        assert_eq!(report.tests_passed(), 1);
        assert_eq!(report.tests_failed(), 2);
        assert_eq!(
            report.failure_messages(),
            vec!["test_burst: allowed 11 of 10", "test_reset: Failed"]
        );
        assert!(!report.passed());
    }

    #[test]
    fn test_success_flag_alone_is_not_a_pass() {
        let report = EvaluationReport {
            success: true,
            tests: [("t".to_string(), outcome(false, "boom"))].into_iter().collect(),
            metrics: BTreeMap::new(),
        };
        assert!(!report.passed());
    }

    #[test]
    fn test_report_deserializes_evaluator_json() {
        let json = r#"{
            "success": true,
            "tests": { "test_basic": { "pass": true, "category": "correctness" } },
            "metrics": { "correctness_score": 1.0 }
        }"#;
        let report: EvaluationReport = serde_json::from_str(json).unwrap();
        assert!(report.passed());
        assert_eq!(report.metrics["correctness_score"], 1.0);
    }
}
