//! Implementer that delegates drafting to an external command.
//!
//! The [`ImplementerRequest`] is written to the command's stdin as JSON and
//! the command answers on stdout with
//! `{"candidate_source": "...", "annotations": ["..."]}`. Candidate source
//! wrapped in a fenced code block is unwrapped.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::annotation::fenced_block;
use crate::capability::{
    CapabilityError, CapabilityResult, Implementer, ImplementerOutput, ImplementerRequest,
};

/// Body of the first fenced code block in `response`, or the trimmed
/// response when it has no fence.
pub fn extract_code(response: &str) -> String {
    fenced_block(response).unwrap_or(response.trim()).to_string()
}

/// Runs `program args...` once per draft.
#[derive(Debug, Clone)]
pub struct CommandImplementer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandImplementer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Split a shell-style command line on whitespace.
    pub fn from_command_line(command: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), timeout))
    }

    async fn invoke(&self, payload: Vec<u8>) -> CapabilityResult<std::process::Output> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CapabilityError::ImplementerFailed(format!("failed to start {}: {e}", self.program))
            })?;

        // Commands that ignore stdin may exit before reading it.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(CapabilityError::ImplementerFailed(format!(
                        "failed to send request: {e}"
                    )));
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| CapabilityError::ImplementerFailed(e.to_string()))
    }
}

#[async_trait]
impl Implementer for CommandImplementer {
    async fn implement(&self, request: ImplementerRequest<'_>) -> CapabilityResult<ImplementerOutput> {
        let payload = serde_json::to_vec(&request)
            .map_err(|e| CapabilityError::ImplementerFailed(format!("failed to encode request: {e}")))?;
        debug!(approach = request.approach, attempt = request.attempt, "invoking implementer command");

        let output = tokio::time::timeout(self.timeout, self.invoke(payload))
            .await
            .map_err(|_| CapabilityError::ImplementerTimeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::ImplementerFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut drafted: ImplementerOutput = serde_json::from_str(stdout.trim()).map_err(|e| {
            CapabilityError::ImplementerFailed(format!("implementer output is not valid JSON: {e}"))
        })?;
        drafted.candidate_source = extract_code(&drafted.candidate_source);
        if drafted.candidate_source.is_empty() {
            return Err(CapabilityError::ImplementerFailed(
                "implementer returned no code".to_string(),
            ));
        }
        Ok(drafted)
    }
}
