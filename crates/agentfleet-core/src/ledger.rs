//! Append-only, per-approach decision ledger.
//!
//! The ledger owns sequence assignment and the one permitted mutation: the
//! retroactive overwrite of `chosen` when a pending blocking decision is
//! resolved. Resolution must happen before the evaluator consumes the
//! decision's context; the agent loop enforces that ordering.

use chrono::Utc;

use crate::domain::{Decision, DecisionCandidate};

/// Errors produced by ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("decision #{sequence} not found")]
    NotFound { sequence: u64 },

    #[error("decision #{sequence} is speculative and cannot be resolved")]
    NotBlocking { sequence: u64 },

    #[error("decision #{sequence} was already resolved")]
    AlreadyResolved { sequence: u64 },

    #[error("option {option:?} is not one of {options:?}")]
    NotAnOption { option: String, options: Vec<String> },
}

/// Result type for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone)]
struct Entry {
    decision: Decision,
    pending: bool,
}

/// Ordered decision history for a single approach.
#[derive(Debug, Clone)]
pub struct DecisionLedger {
    approach: String,
    entries: Vec<Entry>,
}

impl DecisionLedger {
    pub fn new(approach: impl Into<String>) -> Self {
        Self {
            approach: approach.into(),
            entries: Vec::new(),
        }
    }

    pub fn approach(&self) -> &str {
        &self.approach
    }

    /// Record `candidate` with the next sequence number.
    ///
    /// Always succeeds. `blocking` is the classification decided by the
    /// caller's policy; blocking entries start out pending.
    pub fn append(&mut self, candidate: DecisionCandidate, blocking: bool) -> u64 {
        let sequence = self.entries.len() as u64 + 1;
        self.entries.push(Entry {
            decision: Decision {
                question: candidate.question,
                options: candidate.options,
                chosen: candidate.chosen,
                reasoning: candidate.reasoning,
                blocking,
                sequence,
                timestamp: Utc::now(),
            },
            pending: blocking,
        });
        sequence
    }

    pub fn get(&self, sequence: u64) -> Option<&Decision> {
        self.index_of(sequence).map(|i| &self.entries[i].decision)
    }

    /// Full ordered history.
    pub fn decisions(&self) -> Vec<Decision> {
        self.entries.iter().map(|e| e.decision.clone()).collect()
    }

    /// Blocking decisions still awaiting resolution.
    pub fn pending(&self) -> Vec<&Decision> {
        self.entries
            .iter()
            .filter(|e| e.pending)
            .map(|e| &e.decision)
            .collect()
    }

    pub fn is_pending(&self, sequence: u64) -> bool {
        self.index_of(sequence)
            .map(|i| self.entries[i].pending)
            .unwrap_or(false)
    }

    /// Apply a human resolution to a pending blocking decision.
    pub fn resolve(&mut self, sequence: u64, option: &str) -> LedgerResult<&Decision> {
        let index = self
            .index_of(sequence)
            .ok_or(LedgerError::NotFound { sequence })?;
        let entry = &mut self.entries[index];

        if !entry.decision.blocking {
            return Err(LedgerError::NotBlocking { sequence });
        }
        if !entry.pending {
            return Err(LedgerError::AlreadyResolved { sequence });
        }
        if !entry.decision.is_option(option) {
            return Err(LedgerError::NotAnOption {
                option: option.to_string(),
                options: entry.decision.options.clone(),
            });
        }

        entry.decision.chosen = option.to_string();
        entry.pending = false;
        Ok(&entry.decision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_of(&self, sequence: u64) -> Option<usize> {
        // Sequences are gapless from 1, so the position is implied.
        let index = usize::try_from(sequence).ok()?.checked_sub(1)?;
        (index < self.entries.len()).then_some(index)
    }
}
