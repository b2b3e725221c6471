//! Structured lifecycle events for tournaments and agent loops.
//!
//! Events are emitted at `info!` with an `event` field so they can be
//! filtered or shipped as JSON (see [`crate::telemetry::init_tracing`]).

use tracing::info;

/// Approach-scoped span to attach to a future with `Instrument`.
pub fn approach_span(tournament_id: &str, approach: &str) -> tracing::Span {
    tracing::info_span!(
        "agentfleet.approach",
        tournament_id = %tournament_id,
        approach = %approach
    )
}

pub fn emit_tournament_started(tournament_id: &str, approaches: usize, max_iterations: u32, interactive: bool) {
    info!(
        event = "tournament.started",
        tournament_id = %tournament_id,
        approaches,
        max_iterations,
        interactive,
    );
}

pub fn emit_iteration(approach: &str, attempt: u32, tests_passed: u32, tests_failed: u32) {
    info!(
        event = "agent.iteration",
        approach = %approach,
        attempt,
        tests_passed,
        tests_failed,
    );
}

pub fn emit_decision(approach: &str, sequence: u64, blocking: bool, chosen: &str) {
    info!(
        event = "agent.decision",
        approach = %approach,
        sequence,
        blocking,
        chosen = %chosen,
    );
}

/// A loop is now waiting on the attention queue.
pub fn emit_suspended(approach: &str, sequence: u64) {
    info!(event = "agent.suspended", approach = %approach, sequence);
}

pub fn emit_terminated(approach: &str, success: bool, iterations: usize, termination: &dyn std::fmt::Display) {
    info!(
        event = "agent.terminated",
        approach = %approach,
        success,
        iterations,
        termination = %termination,
    );
}

pub fn emit_tournament_completed(
    tournament_id: &str,
    winner: Option<&str>,
    winning_score: f64,
    duration_ms: u64,
) {
    info!(
        event = "tournament.completed",
        tournament_id = %tournament_id,
        winner = winner.unwrap_or("-"),
        winning_score,
        duration_ms,
    );
}

/// Emit a warning when an approach task ends abnormally.
pub fn emit_approach_aborted(approach: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "agent.aborted", approach = %approach, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approach_span_create() {
        let _span = approach_span("t-1", "Token bucket").entered();
        emit_iteration("Token bucket", 1, 3, 2);
        emit_suspended("Token bucket", 1);
    }
}
