//! Concurrent fan-out of agent loops and fan-in of their results.
//!
//! One tokio task runs per approach. Tasks never abort their siblings: a
//! provisioning failure or a panic becomes a failed [`AgentResult`] for that
//! approach only, and every task is joined before ranking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::agent_loop::{AgentLoop, Collaborators};
use crate::annotation::{
    AllSpeculative, AnnotatedClassification, AnnotationParser, ClassificationPolicy, ParserChain,
};
use crate::attention::{
    AttentionQueue, DecisionResolver, PendingDecision, ResolutionError, ResolutionResult,
};
use crate::capability::{Evaluator, Implementer};
use crate::domain::{AgentResult, FleetError, Plan, Result, TournamentResult};
use crate::events::{EventSink, FleetEvent, TracingEventSink};
use crate::metrics::METRICS;
use crate::obs;
use crate::scoring;
use crate::workspace::{slugify, WorkspaceProvider};

/// How blocking decisions are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Every decision is speculative; no loop ever suspends.
    #[default]
    Speculative,
    /// Blocking decisions go through the shared attention queue.
    Interactive,
}

/// Per-run tournament settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentConfig {
    pub max_iterations: u32,

    pub mode: Mode,

    /// Global wall-clock limit; `None` disables it.
    pub timeout: Option<Duration>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            mode: Mode::Speculative,
            timeout: None,
        }
    }
}

impl TournamentConfig {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Orchestrates one agent loop per approach against a shared plan.
pub struct Tournament {
    implementer: Arc<dyn Implementer>,
    evaluator: Arc<dyn Evaluator>,
    workspaces: Arc<dyn WorkspaceProvider>,
    parser: Arc<dyn AnnotationParser>,
    policy: Arc<dyn ClassificationPolicy>,
    events: Arc<dyn EventSink>,
    resolver: Option<Arc<dyn DecisionResolver>>,
    attention: Arc<AttentionQueue>,
}

impl Tournament {
    /// Defaults: [`ParserChain`], annotated classification, tracing events and
    /// no programmatic resolver.
    pub fn new(
        implementer: Arc<dyn Implementer>,
        evaluator: Arc<dyn Evaluator>,
        workspaces: Arc<dyn WorkspaceProvider>,
    ) -> Self {
        Self {
            implementer,
            evaluator,
            workspaces,
            parser: Arc::new(ParserChain::default()),
            policy: Arc::new(AnnotatedClassification),
            events: Arc::new(TracingEventSink),
            resolver: None,
            attention: Arc::new(AttentionQueue::new()),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn AnnotationParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Classification used in interactive mode.
    pub fn with_policy(mut self, policy: Arc<dyn ClassificationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Answer queued decisions programmatically, one at a time in FIFO order.
    pub fn with_resolver(mut self, resolver: Arc<dyn DecisionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The queue shared by every loop in interactive mode.
    pub fn attention(&self) -> Arc<AttentionQueue> {
        Arc::clone(&self.attention)
    }

    /// Blocking decisions awaiting an answer, in enqueue order.
    pub fn pending_decisions(&self) -> Vec<PendingDecision> {
        self.attention.pending()
    }

    /// Answer a queued decision; only the loop that raised it resumes.
    pub fn resolve(&self, approach: &str, sequence: u64, option: &str) -> ResolutionResult<()> {
        self.attention.resolve(approach, sequence, option)
    }

    /// Run every approach to termination and rank the results.
    ///
    /// Fails only on an invalid approach list or config; everything that goes
    /// wrong inside a loop is reported through its [`AgentResult`].
    pub async fn run(
        &self,
        plan: Plan,
        approaches: &[String],
        config: &TournamentConfig,
    ) -> Result<TournamentResult> {
        validate_approaches(approaches)?;
        if config.max_iterations == 0 {
            return Err(FleetError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let tournament_id = Uuid::new_v4();
        let tid = tournament_id.to_string();
        let interactive = config.mode == Mode::Interactive;
        obs::emit_tournament_started(&tid, approaches.len(), config.max_iterations, interactive);

        let plan = Arc::new(plan);
        let policy: Arc<dyn ClassificationPolicy> = if interactive {
            Arc::clone(&self.policy)
        } else {
            Arc::new(AllSpeculative)
        };
        let collaborators = Collaborators {
            implementer: Arc::clone(&self.implementer),
            evaluator: Arc::clone(&self.evaluator),
            parser: Arc::clone(&self.parser),
            policy,
            events: Arc::clone(&self.events),
        };

        let (cancel_tx, _cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let watchdog = config.timeout.map(|limit| {
            let cancel_tx = Arc::clone(&cancel_tx);
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(timeout_secs = limit.as_secs_f64(), "tournament timeout reached; cancelling loops");
                let _ = cancel_tx.send(true);
            })
        });
        let resolver_task = match (&self.resolver, interactive) {
            (Some(resolver), true) => Some(spawn_resolver(
                Arc::clone(&self.attention),
                Arc::clone(resolver),
            )),
            _ => None,
        };

        let mut handles: Vec<(String, JoinHandle<AgentResult>)> = Vec::with_capacity(approaches.len());
        for approach in approaches {
            let workspaces = Arc::clone(&self.workspaces);
            let plan = Arc::clone(&plan);
            let collaborators = collaborators.clone();
            let attention = interactive.then(|| Arc::clone(&self.attention));
            let cancel_rx = cancel_tx.subscribe();
            let max_iterations = config.max_iterations;
            let name = approach.clone();

            let task = async move {
                let workspace = match workspaces.provision(&name).await {
                    Ok(workspace) => workspace,
                    Err(e) => {
                        obs::emit_approach_aborted(&name, &e);
                        let result =
                            AgentResult::aborted(name, format!("workspace provisioning failed: {e}"));
                        emit_terminated(collaborators.events.as_ref(), &result);
                        return result;
                    }
                };

                let mut agent = AgentLoop::new(plan, workspace, max_iterations, collaborators)
                    .with_cancellation(cancel_rx);
                if let Some(queue) = attention {
                    agent = agent.with_attention(queue);
                }
                agent.run().await
            };

            let span = obs::approach_span(&tid, approach);
            handles.push((approach.clone(), tokio::spawn(task.instrument(span))));
        }

        let (names, tasks): (Vec<String>, Vec<JoinHandle<AgentResult>>) = handles.into_iter().unzip();
        let joined = join_all(tasks).await;

        let mut results = Vec::with_capacity(joined.len());
        for (approach, outcome) in names.into_iter().zip(joined) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    obs::emit_approach_aborted(&approach, &e);
                    let result = AgentResult::aborted(approach, format!("approach task failed: {e}"));
                    emit_terminated(self.events.as_ref(), &result);
                    results.push(result);
                }
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        if let Some(resolver_task) = resolver_task {
            resolver_task.abort();
        }

        scoring::score_all(&mut results, &plan);
        let plan = Arc::try_unwrap(plan).unwrap_or_else(|shared| (*shared).clone());
        let mut outcome = TournamentResult::new(plan, results);
        outcome.tournament_id = tournament_id;

        let winner = outcome.winner();
        obs::emit_tournament_completed(
            &tid,
            winner.map(|w| w.approach.as_str()),
            winner.map(|w| w.score).unwrap_or(0.0),
            started.elapsed().as_millis() as u64,
        );
        self.events.emit(FleetEvent::TournamentCompleted {
            tournament_id,
            ranking: outcome
                .results()
                .iter()
                .map(|r| (r.approach.clone(), r.score))
                .collect(),
            winner: winner.map(|w| w.approach.clone()),
        });
        METRICS.inc_tournaments();
        METRICS.flush();

        Ok(outcome)
    }
}

/// Approach names must be non-blank and distinct, including after
/// slugification (they share a workspace namespace).
fn validate_approaches(approaches: &[String]) -> Result<()> {
    if approaches.is_empty() {
        return Err(FleetError::InvalidApproaches(
            "at least one approach is required".to_string(),
        ));
    }

    let mut names = HashSet::new();
    let mut slugs = HashSet::new();
    for approach in approaches {
        if approach.trim().is_empty() {
            return Err(FleetError::InvalidApproaches(
                "approach names must not be blank".to_string(),
            ));
        }
        if !names.insert(approach.as_str()) {
            return Err(FleetError::InvalidApproaches(format!(
                "duplicate approach: {approach}"
            )));
        }
        if !slugs.insert(slugify(approach)) {
            return Err(FleetError::InvalidApproaches(format!(
                "approach {approach:?} collides with another approach's workspace name"
            )));
        }
    }
    Ok(())
}

fn emit_terminated(events: &dyn EventSink, result: &AgentResult) {
    events.emit(FleetEvent::AgentTerminated {
        approach: result.approach.clone(),
        result: Box::new(result.clone()),
    });
}

/// Drain the attention queue with `resolver`, one decision at a time.
fn spawn_resolver(
    queue: Arc<AttentionQueue>,
    resolver: Arc<dyn DecisionResolver>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(pending) = queue.next().await {
            let option = resolver.resolve(&pending).await;
            match queue.resolve(&pending.approach, pending.sequence(), &option) {
                Ok(()) => {}
                Err(ResolutionError::NotAnOption { .. }) => {
                    warn!(
                        approach = %pending.approach,
                        sequence = pending.sequence(),
                        option = %option,
                        "resolver picked a non-member option; accepting suggestion"
                    );
                    let _ = queue.resolve(
                        &pending.approach,
                        pending.sequence(),
                        &pending.decision.chosen,
                    );
                }
                Err(e) => warn!(approach = %pending.approach, error = %e, "resolution dropped"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_approaches() {
        assert!(validate_approaches(&names(&["Token bucket", "Sliding window"])).is_ok());
        assert!(validate_approaches(&[]).is_err());
        assert!(validate_approaches(&names(&["A", " "])).is_err());
        assert!(validate_approaches(&names(&["A", "A"])).is_err());
        assert!(validate_approaches(&names(&["Token bucket", "token-bucket"])).is_err());
    }

    #[test]
    fn test_config_builders() {
        let config = TournamentConfig::default()
            .with_max_iterations(3)
            .with_mode(Mode::Interactive)
            .with_timeout(Duration::from_secs(60));
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.mode, Mode::Interactive);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
    }
}
