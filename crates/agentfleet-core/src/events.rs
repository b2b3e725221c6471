//! Outbound event stream.
//!
//! Loops and the orchestrator push [`FleetEvent`]s into an [`EventSink`] in the
//! order they happen. Sinks are write-only: nothing in the core reads events
//! back.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{AgentResult, Decision, Iteration};

/// One observable step of a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    DecisionRecorded {
        approach: String,
        decision: Decision,
    },
    IterationCompleted {
        approach: String,
        iteration: Iteration,
    },
    /// Carries the loop's full result. `score` is still zero here; ranking
    /// happens after every loop has terminated.
    AgentTerminated {
        approach: String,
        result: Box<AgentResult>,
    },
    TournamentCompleted {
        tournament_id: Uuid,
        /// `(approach, score)` in rank order.
        ranking: Vec<(String, f64)>,
        winner: Option<String>,
    },
}

impl FleetEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FleetEvent::DecisionRecorded { .. } => "decision_recorded",
            FleetEvent::IterationCompleted { .. } => "iteration_completed",
            FleetEvent::AgentTerminated { .. } => "agent_terminated",
            FleetEvent::TournamentCompleted { .. } => "tournament_completed",
        }
    }

    /// Approach the event belongs to, if it is approach-scoped.
    pub fn approach(&self) -> Option<&str> {
        match self {
            FleetEvent::DecisionRecorded { approach, .. }
            | FleetEvent::IterationCompleted { approach, .. }
            | FleetEvent::AgentTerminated { approach, .. } => Some(approach),
            FleetEvent::TournamentCompleted { .. } => None,
        }
    }
}

/// Destination for [`FleetEvent`]s.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FleetEvent);
}

/// Writes every event to `tracing` at debug level as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: FleetEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => tracing::debug!(event = event.kind(), %payload, "fleet event"),
            Err(e) => tracing::warn!(event = event.kind(), error = %e, "unserializable fleet event"),
        }
    }
}

/// Forwards events into a tokio channel, e.g. for a live display.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<FleetEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<FleetEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<FleetEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: FleetEvent) {
        let _ = self.tx.send(event);
    }
}

/// Buffers events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<FleetEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FleetEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events belonging to one approach, in emission order.
    pub fn events_for(&self, approach: &str) -> Vec<FleetEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.approach() == Some(approach))
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: FleetEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: FleetEvent) {}
}
