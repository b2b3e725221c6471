//! Interpretive choices recorded by an approach while drafting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed but not yet recorded decision.
///
/// Produced by an [`AnnotationParser`](crate::annotation::AnnotationParser);
/// the ledger assigns the sequence number and timestamp on append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCandidate {
    pub question: String,
    pub options: Vec<String>,
    pub chosen: String,
    #[serde(default)]
    pub reasoning: String,
    /// The blocking hint carried by the annotation itself. The active
    /// [`ClassificationPolicy`](crate::annotation::ClassificationPolicy) has
    /// the final word.
    #[serde(default)]
    pub blocking: bool,
}

impl DecisionCandidate {
    /// Whether `chosen` is one of `options`.
    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty() && self.options.iter().any(|o| o == &self.chosen)
    }
}

/// A recorded interpretive choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The ambiguity being resolved.
    pub question: String,

    /// Options that were considered, in the order the agent listed them.
    pub options: Vec<String>,

    /// The selected option; always a member of `options`.
    pub chosen: String,

    /// The agent's explanation for its choice.
    pub reasoning: String,

    /// Whether the choice needed human resolution before evaluation.
    pub blocking: bool,

    /// Per-approach sequence number, starting at 1 with no gaps.
    pub sequence: u64,

    /// When the decision was appended.
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn is_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.blocking { "BLOCKING" } else { "SPECULATIVE" };
        write!(
            f,
            "#{} {}: {} -> {}",
            self.sequence, mode, self.question, self.chosen
        )
    }
}
