//! Evaluator that runs the plan's evaluation script in a subprocess.
//!
//! The candidate is written next to the script inside the approach's
//! workspace and the interpreter is invoked as `<interpreter> <script>
//! <solution>`. The script prints one JSON object on stdout:
//!
//! ```json
//! {"success": true, "tests": {"test_x": {"pass": true, "category": "correctness", "message": ""}}, "metrics": {"correctness_score": 1.0}}
//! ```

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::capability::{CapabilityError, CapabilityResult, EvaluationReport, Evaluator};
use crate::domain::Plan;
use crate::workspace::Workspace;

const MAX_OUTPUT_IN_ERROR: usize = 500;

/// Script source and file names taken from a plan's `evaluator_spec`.
///
/// The `evaluator_spec` value is either the script source as a JSON string, or an object with
/// `script` and optional `script_name` / `solution_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorScript {
    pub source: String,
    pub script_name: String,
    pub solution_name: String,
}

impl EvaluatorScript {
    pub fn from_spec(spec: &serde_json::Value) -> Option<Self> {
        let (source, object) = match spec {
            serde_json::Value::String(source) => (source.clone(), None),
            serde_json::Value::Object(map) => (
                map.get("script")
                    .or_else(|| map.get("eval_script"))
                    .and_then(|v| v.as_str())?
                    .to_string(),
                Some(map),
            ),
            _ => return None,
        };
        let name = |key: &str, default: &str| {
            object
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Some(Self {
            source,
            script_name: name("script_name", "eval.py"),
            solution_name: name("solution_name", "solution.py"),
        })
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_OUTPUT_IN_ERROR) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Runs evaluation scripts with a configurable interpreter and timeout.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    interpreter: String,
    timeout: Duration,
}

impl ProcessEvaluator {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Evaluator for ProcessEvaluator {
    async fn evaluate(
        &self,
        plan: &Plan,
        candidate_source: &str,
        workspace: &Workspace,
    ) -> CapabilityResult<EvaluationReport> {
        let script = EvaluatorScript::from_spec(plan.evaluator_spec()).ok_or_else(|| {
            CapabilityError::EvaluatorCrash("plan does not carry an evaluator script".to_string())
        })?;

        let script_path = workspace.path.join(&script.script_name);
        let solution_path = workspace.path.join(&script.solution_name);
        let io_err = |e: std::io::Error| CapabilityError::EvaluatorCrash(format!("evaluation error: {e}"));
        tokio::fs::write(&script_path, &script.source).await.map_err(io_err)?;
        tokio::fs::write(&solution_path, candidate_source).await.map_err(io_err)?;

        let start = Instant::now();
        let child = Command::new(&self.interpreter)
            .arg(&script_path)
            .arg(&solution_path)
            .current_dir(&workspace.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CapabilityError::EvaluatorCrash(format!(
                    "failed to start {}: {e}",
                    self.interpreter
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                CapabilityError::EvaluatorCrash(format!(
                    "evaluation timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(io_err)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            approach = %workspace.approach,
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            "evaluator finished"
        );

        let mut report: EvaluationReport = serde_json::from_str(stdout.trim()).map_err(|_| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let shown = if stdout.trim().is_empty() { stderr } else { stdout.clone() };
            CapabilityError::MalformedEvaluatorOutput(format!(
                "eval script output invalid JSON: {}",
                truncate(&shown)
            ))
        })?;
        report.success = report.success && output.status.success();
        Ok(report)
    }
}
