//! The attention queue: a single FIFO of blocking decisions shared by every
//! agent loop in an interactive tournament.
//!
//! A loop that raises a blocking decision calls [`AttentionQueue::submit`] and
//! awaits the returned [`Suspension`]. Whoever drives the queue (a programmatic
//! [`DecisionResolver`] or a caller polling [`AttentionQueue::pending`]) answers
//! with [`AttentionQueue::resolve`], which wakes exactly that loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

use crate::domain::Decision;

/// Errors returned when answering a queued decision.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no pending decision #{sequence} for approach {approach}")]
    UnknownDecision { approach: String, sequence: u64 },

    #[error("option {option:?} is not one of {options:?}")]
    NotAnOption { option: String, options: Vec<String> },

    #[error("approach {approach} is no longer waiting")]
    LoopGone { approach: String },
}

/// Result type for attention queue resolution.
pub type ResolutionResult<T> = std::result::Result<T, ResolutionError>;

/// A blocking decision waiting for a human (or resolver) answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDecision {
    pub approach: String,
    pub decision: Decision,
}

impl PendingDecision {
    pub fn sequence(&self) -> u64 {
        self.decision.sequence
    }
}

struct Slot {
    pending: PendingDecision,
    reply: oneshot::Sender<String>,
}

/// Handle a suspended loop awaits until its decision is resolved.
#[derive(Debug)]
pub struct Suspension {
    rx: oneshot::Receiver<String>,
}

impl Suspension {
    /// The resolved option, or `None` if the queue closed or withdrew the
    /// decision first.
    pub async fn wait(self) -> Option<String> {
        self.rx.await.ok()
    }
}

/// Mutex-guarded FIFO with a notifier for consumers.
#[derive(Default)]
pub struct AttentionQueue {
    slots: Mutex<VecDeque<Slot>>,
    notify: Notify,
    closed: AtomicBool,
}

impl AttentionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, VecDeque<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a blocking decision and return the handle to suspend on.
    pub fn submit(&self, approach: &str, decision: Decision) -> Suspension {
        let (tx, rx) = oneshot::channel();
        let sequence = decision.sequence;
        let mut slots = self.slots();
        slots.push_back(Slot {
            pending: PendingDecision {
                approach: approach.to_string(),
                decision,
            },
            reply: tx,
        });
        debug!(approach, sequence, queued = slots.len(), "decision queued for attention");
        drop(slots);
        self.notify.notify_waiters();
        Suspension { rx }
    }

    /// Snapshot of every queued decision in enqueue order.
    pub fn pending(&self) -> Vec<PendingDecision> {
        self.slots().iter().map(|s| s.pending.clone()).collect()
    }

    /// The decision that should be surfaced next.
    pub fn front(&self) -> Option<PendingDecision> {
        self.slots().front().map(|s| s.pending.clone())
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Wait until a decision is at the front of the queue.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<PendingDecision> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(front) = self.front() {
                return Some(front);
            }
            notified.await;
        }
    }

    /// Answer the queued decision `sequence` raised by `approach`.
    ///
    /// A non-member option leaves the decision queued.
    pub fn resolve(&self, approach: &str, sequence: u64, option: &str) -> ResolutionResult<()> {
        let mut slots = self.slots();
        let index = slots
            .iter()
            .position(|s| s.pending.approach == approach && s.pending.sequence() == sequence)
            .ok_or_else(|| ResolutionError::UnknownDecision {
                approach: approach.to_string(),
                sequence,
            })?;

        let decision = &slots[index].pending.decision;
        if !decision.is_option(option) {
            return Err(ResolutionError::NotAnOption {
                option: option.to_string(),
                options: decision.options.clone(),
            });
        }

        let slot = slots.remove(index).ok_or_else(|| ResolutionError::UnknownDecision {
            approach: approach.to_string(),
            sequence,
        })?;
        drop(slots);
        self.notify.notify_waiters();

        slot.reply
            .send(option.to_string())
            .map_err(|_| ResolutionError::LoopGone {
                approach: approach.to_string(),
            })
    }

    /// Drop a queued decision without answering it (used on cancellation).
    pub fn withdraw(&self, approach: &str, sequence: u64) -> bool {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|s| !(s.pending.approach == approach && s.pending.sequence() == sequence));
        let removed = slots.len() != before;
        drop(slots);
        if removed {
            self.notify.notify_waiters();
        }
        removed
    }

    /// Stop surfacing decisions. Any still-queued decision is dropped, which
    /// wakes its loop with no answer.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots().clear();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

/// Programmatic answerer for queued decisions.
#[async_trait]
pub trait DecisionResolver: Send + Sync {
    /// Pick one of `pending.decision.options`.
    async fn resolve(&self, pending: &PendingDecision) -> String;
}

/// Confirms whatever the agent suggested.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptSuggestion;

#[async_trait]
impl DecisionResolver for AcceptSuggestion {
    async fn resolve(&self, pending: &PendingDecision) -> String {
        pending.decision.chosen.clone()
    }
}
