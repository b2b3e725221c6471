//! The per-approach refine-and-evaluate state machine.
//!
//! ```text
//! Drafting -> Evaluating -> Passed
//!                        -> Fixing -> Drafting      (attempt < max)
//!                        -> Exhausted               (attempt = max, or repeated crash)
//! ```
//!
//! Every failure of an external capability is converted into iteration
//! state; `run` never returns an error. Cancellation is observed only while
//! waiting on the implementer or on a blocking decision, never during an
//! evaluator call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::annotation::{parse_annotations, AnnotationParser, ClassificationPolicy};
use crate::attention::AttentionQueue;
use crate::capability::{
    CapabilityError, EvaluationReport, Evaluator, Implementer, ImplementerOutput,
    ImplementerRequest,
};
use crate::domain::{AgentResult, Iteration, Plan, Termination};
use crate::events::{EventSink, FleetEvent};
use crate::ledger::DecisionLedger;
use crate::metrics::METRICS;
use crate::obs;
use crate::workspace::Workspace;

/// Where a loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Drafting,
    Evaluating,
    Fixing,
    Passed,
    Exhausted,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopPhase::Drafting => "drafting",
            LoopPhase::Evaluating => "evaluating",
            LoopPhase::Fixing => "fixing",
            LoopPhase::Passed => "passed",
            LoopPhase::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// The external pieces a loop talks to. Cheap to clone; shared across loops.
#[derive(Clone)]
pub struct Collaborators {
    pub implementer: Arc<dyn Implementer>,
    pub evaluator: Arc<dyn Evaluator>,
    pub parser: Arc<dyn AnnotationParser>,
    pub policy: Arc<dyn ClassificationPolicy>,
    pub events: Arc<dyn EventSink>,
}

/// One approach's bounded loop.
pub struct AgentLoop {
    plan: Arc<Plan>,
    workspace: Workspace,
    max_iterations: u32,
    collaborators: Collaborators,
    attention: Option<Arc<AttentionQueue>>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Mutable state owned by a running loop.
struct LoopState {
    phase: LoopPhase,
    ledger: DecisionLedger,
    iterations: Vec<Iteration>,
    /// Most recent candidate the implementer produced.
    candidate: Option<String>,
    /// Failure messages handed to the next draft.
    feedback: Vec<String>,
    /// Crash message of the previous attempt, if it crashed.
    last_crash: Option<String>,
}

impl LoopState {
    fn transition(&mut self, approach: &str, next: LoopPhase) {
        debug!(approach, from = %self.phase, to = %next, "loop transition");
        self.phase = next;
    }
}

enum Draft {
    Ready(ImplementerOutput),
    Failed(CapabilityError),
    Cancelled,
}

/// Resolves once the watch flag flips to `true`. Never resolves if there is
/// no cancellation channel or its sender is gone.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        if rx.wait_for(|flag| *flag).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

impl AgentLoop {
    pub fn new(
        plan: Arc<Plan>,
        workspace: Workspace,
        max_iterations: u32,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            plan,
            workspace,
            max_iterations: max_iterations.max(1),
            collaborators,
            attention: None,
            cancel: None,
        }
    }

    /// Route blocking decisions through `queue`. Without a queue every
    /// decision is speculative.
    pub fn with_attention(mut self, queue: Arc<AttentionQueue>) -> Self {
        self.attention = Some(queue);
        self
    }

    /// Stop at the next suspension point once `rx` reads `true`.
    pub fn with_cancellation(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    pub fn approach(&self) -> &str {
        &self.workspace.approach
    }

    /// Drive the loop to termination.
    pub async fn run(mut self) -> AgentResult {
        let approach = self.workspace.approach.clone();
        let mut state = LoopState {
            phase: LoopPhase::Drafting,
            ledger: DecisionLedger::new(approach.clone()),
            iterations: Vec::new(),
            candidate: None,
            feedback: Vec::new(),
            last_crash: None,
        };
        let mut termination = Termination::IterationBudgetExhausted;
        let mut attempt = 1;

        while attempt <= self.max_iterations {
            if is_cancelled(&self.cancel) {
                termination = Termination::Cancelled;
                break;
            }
            state.transition(&approach, LoopPhase::Drafting);

            let mut crash = None;
            let iteration = match self.draft(&state, attempt).await {
                Draft::Cancelled => {
                    termination = Termination::Cancelled;
                    break;
                }
                Draft::Failed(err) => {
                    warn!(approach = %approach, attempt, error = %err, "implementer failed");
                    Iteration {
                        attempt,
                        tests_passed: 0,
                        tests_failed: 1,
                        decisions_made: Vec::new(),
                        error_messages: vec![err.to_string()],
                        metrics: BTreeMap::new(),
                        evaluator_success: false,
                        code_snapshot: state.candidate.clone(),
                    }
                }
                Draft::Ready(output) => {
                    let Some(decisions_made) =
                        self.record_decisions(&mut state, &output.annotations).await
                    else {
                        termination = Termination::Cancelled;
                        break;
                    };
                    state.candidate = Some(output.candidate_source);
                    state.transition(&approach, LoopPhase::Evaluating);
                    let (iteration, crashed) =
                        self.evaluate(&state, attempt, decisions_made).await;
                    crash = crashed;
                    iteration
                }
            };

            let passed = iteration.success();
            let crash_repeated = crash.is_some() && crash == state.last_crash;
            state.last_crash = crash;
            self.complete_iteration(&mut state, iteration);

            if passed {
                state.transition(&approach, LoopPhase::Passed);
                termination = Termination::Passed;
                break;
            }
            if crash_repeated {
                state.transition(&approach, LoopPhase::Exhausted);
                termination = Termination::EvaluatorFailed {
                    message: state.last_crash.clone().unwrap_or_default(),
                };
                break;
            }
            if attempt == self.max_iterations {
                state.transition(&approach, LoopPhase::Exhausted);
                break;
            }
            state.transition(&approach, LoopPhase::Fixing);
            attempt += 1;
        }

        self.finish(state, termination, attempt)
    }

    async fn draft(&mut self, state: &LoopState, attempt: u32) -> Draft {
        let request = ImplementerRequest {
            plan: self.plan.as_ref(),
            approach: &self.workspace.approach,
            attempt,
            max_iterations: self.max_iterations,
            prior_iterations: &state.iterations,
            feedback: &state.feedback,
            workspace: &self.workspace,
        };
        let implementer = &self.collaborators.implementer;

        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => Draft::Cancelled,
            output = implementer.implement(request) => match output {
                Ok(output) => Draft::Ready(output),
                Err(err) => Draft::Failed(err),
            },
        }
    }

    /// Parse, classify and append every annotation, suspending on blocking
    /// ones. Returns the recorded sequences, or `None` if cancelled while
    /// suspended.
    async fn record_decisions(
        &mut self,
        state: &mut LoopState,
        annotations: &[String],
    ) -> Option<Vec<u64>> {
        let candidates = parse_annotations(self.collaborators.parser.as_ref(), annotations);
        let mut recorded = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let blocking =
                self.attention.is_some() && self.collaborators.policy.is_blocking(&candidate);
            let sequence = state.ledger.append(candidate, blocking);
            recorded.push(sequence);
            METRICS.inc_decisions(blocking);

            let resolved = !blocking || self.await_resolution(state, sequence).await;
            // A withdrawn decision stays in the trail with its suggestion.
            self.emit_decision(state, sequence);
            if !resolved {
                return None;
            }
        }
        Some(recorded)
    }

    fn emit_decision(&self, state: &LoopState, sequence: u64) {
        if let Some(decision) = state.ledger.get(sequence) {
            obs::emit_decision(
                &self.workspace.approach,
                sequence,
                decision.blocking,
                &decision.chosen,
            );
            self.collaborators.events.emit(FleetEvent::DecisionRecorded {
                approach: self.workspace.approach.clone(),
                decision: decision.clone(),
            });
        }
    }

    /// Suspend until the attention queue answers `sequence`. Returns `false`
    /// if the loop was cancelled first.
    async fn await_resolution(&mut self, state: &mut LoopState, sequence: u64) -> bool {
        let (Some(queue), Some(decision)) =
            (self.attention.clone(), state.ledger.get(sequence).cloned())
        else {
            return true;
        };
        let approach = self.workspace.approach.clone();
        let suggestion = decision.chosen.clone();

        obs::emit_suspended(&approach, sequence);
        let suspension = queue.submit(&approach, decision);

        let answer = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => None,
            answer = suspension.wait() => Some(answer),
        };
        let Some(answer) = answer else {
            queue.withdraw(&approach, sequence);
            return false;
        };

        // A closed queue leaves the agent's own suggestion in place.
        let option = answer.unwrap_or(suggestion.clone());
        if let Err(err) = state.ledger.resolve(sequence, &option) {
            warn!(approach = %approach, sequence, error = %err, "resolution rejected; keeping suggestion");
            let _ = state.ledger.resolve(sequence, &suggestion);
        }
        true
    }

    /// Evaluate the current candidate. The second element carries the crash
    /// message when the evaluator failed.
    async fn evaluate(
        &self,
        state: &LoopState,
        attempt: u32,
        decisions_made: Vec<u64>,
    ) -> (Iteration, Option<String>) {
        let source = state.candidate.clone().unwrap_or_default();
        let outcome = self
            .collaborators
            .evaluator
            .evaluate(&self.plan, &source, &self.workspace)
            .await;

        match outcome {
            Ok(report) => (
                iteration_from_report(attempt, decisions_made, &report, source),
                None,
            ),
            Err(err) => {
                METRICS.inc_evaluator_crashes();
                warn!(approach = %self.workspace.approach, attempt, error = %err, "evaluator crashed");
                let message = err.to_string();
                let iteration = Iteration {
                    attempt,
                    tests_passed: 0,
                    tests_failed: 1,
                    decisions_made,
                    error_messages: vec![message.clone()],
                    metrics: BTreeMap::new(),
                    evaluator_success: false,
                    code_snapshot: Some(source),
                };
                (iteration, Some(message))
            }
        }
    }

    fn complete_iteration(&self, state: &mut LoopState, iteration: Iteration) {
        METRICS.inc_iterations();
        obs::emit_iteration(
            &self.workspace.approach,
            iteration.attempt,
            iteration.tests_passed,
            iteration.tests_failed,
        );
        self.collaborators.events.emit(FleetEvent::IterationCompleted {
            approach: self.workspace.approach.clone(),
            iteration: iteration.clone(),
        });

        state.feedback = iteration.error_messages.clone();
        state.iterations.push(iteration);
    }

    fn finish(self, mut state: LoopState, termination: Termination, attempt: u32) -> AgentResult {
        let approach = self.workspace.approach.clone();

        if state.iterations.is_empty() {
            // Cancelled before the first attempt completed.
            state.iterations.push(Iteration {
                attempt,
                tests_passed: 0,
                tests_failed: 0,
                decisions_made: state.ledger.decisions().iter().map(|d| d.sequence).collect(),
                error_messages: vec![format!("cancelled before attempt {attempt} completed")],
                metrics: BTreeMap::new(),
                evaluator_success: false,
                code_snapshot: state.candidate.clone(),
            });
        }

        let success = termination == Termination::Passed;
        let last_metrics = state
            .iterations
            .last()
            .map(|i| i.metrics.clone())
            .unwrap_or_default();
        let metrics = if success {
            last_metrics
        } else {
            let mut metrics: BTreeMap<String, f64> =
                self.plan.metrics().iter().map(|m| (m.clone(), 0.0)).collect();
            metrics.extend(last_metrics);
            metrics
        };

        let result = AgentResult {
            approach: approach.clone(),
            success,
            iterations: state.iterations,
            decision_trail: state.ledger.decisions(),
            metrics,
            final_code: state.candidate.unwrap_or_default(),
            score: 0.0,
            termination,
            workspace: Some(self.workspace.path.clone()),
            branch: self.workspace.branch.clone(),
        };

        obs::emit_terminated(
            &approach,
            result.success,
            result.iteration_count(),
            &result.termination,
        );
        self.collaborators.events.emit(FleetEvent::AgentTerminated {
            approach,
            result: Box::new(result.clone()),
        });
        result
    }
}

fn iteration_from_report(
    attempt: u32,
    decisions_made: Vec<u64>,
    report: &EvaluationReport,
    source: String,
) -> Iteration {
    Iteration {
        attempt,
        tests_passed: report.tests_passed(),
        tests_failed: report.tests_failed(),
        decisions_made,
        error_messages: report.failure_messages(),
        metrics: report.metrics.clone(),
        evaluator_success: report.success,
        code_snapshot: Some(source),
    }
}
