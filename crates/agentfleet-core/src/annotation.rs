//! Free-text annotation parsing and blocking classification.
//!
//! Implementers return interpretive notes as free text. Each note runs through
//! an [`AnnotationParser`]; a note either becomes a well-formed
//! [`DecisionCandidate`] or is dropped. Raw text never travels further than
//! this module.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::domain::DecisionCandidate;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A single matching rule that turns one annotation into a decision candidate.
pub trait AnnotationParser: Send + Sync {
    /// Short rule name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Parse `annotation`, returning `None` when the rule does not match.
    fn parse(&self, annotation: &str) -> Option<DecisionCandidate>;
}

/// Line-tagged notes:
///
/// ```text
/// DECISION: Should rate limiting be per-user or global?
/// OPTIONS: [per-user, global]
/// CHOSEN: per-user
/// REASONING: The interface contract includes a user_id parameter.
/// BLOCKING: no
/// ```
///
/// `OPTIONS` accepts a bracketed comma list or a `|`-separated list.
/// `BLOCKING` is optional and defaults to speculative.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaggedAnnotationParser;

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?im)^[ \t]*(DECISION|OPTIONS|CHOSEN|REASONING|BLOCKING)[ \t]*:[ \t]*(.*?)[ \t]*$")
                .ok()
        })
        .as_ref()
}

fn split_options(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let separator = if trimmed.contains('|') { '|' } else { ',' };
    trimmed
        .split(separator)
        .map(|o| o.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "blocking"
    )
}

impl AnnotationParser for TaggedAnnotationParser {
    fn name(&self) -> &'static str {
        "tagged"
    }

    fn parse(&self, annotation: &str) -> Option<DecisionCandidate> {
        let mut question = None;
        let mut options = None;
        let mut chosen = None;
        let mut reasoning = None;
        let mut blocking = false;

        for caps in tag_pattern()?.captures_iter(annotation) {
            let value = caps[2].trim().trim_matches('"').to_string();
            match caps[1].to_ascii_uppercase().as_str() {
                "DECISION" => question = Some(value),
                "OPTIONS" => options = Some(split_options(&value)),
                "CHOSEN" => chosen = Some(value),
                "REASONING" => reasoning = Some(value),
                "BLOCKING" => blocking = parse_flag(&value),
                _ => {}
            }
        }

        Some(DecisionCandidate {
            question: question?,
            options: options?,
            chosen: chosen?,
            reasoning: reasoning.unwrap_or_default(),
            blocking,
        })
    }
}

/// JSON object notes, optionally wrapped in a ```json fence.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonAnnotationParser;

/// Body of the first fenced code block, or `None` when there is no fence.
pub(crate) fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip the info string (e.g. `json`, `python`) up to the end of the line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

impl AnnotationParser for JsonAnnotationParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, annotation: &str) -> Option<DecisionCandidate> {
        let body = fenced_block(annotation).unwrap_or(annotation);
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        if end < start {
            return None;
        }
        serde_json::from_str(&body[start..=end]).ok()
    }
}

/// First-match chain of parsing rules.
pub struct ParserChain {
    rules: Vec<Box<dyn AnnotationParser>>,
}

impl ParserChain {
    pub fn new(rules: Vec<Box<dyn AnnotationParser>>) -> Self {
        Self { rules }
    }
}

impl Default for ParserChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(JsonAnnotationParser),
            Box::new(TaggedAnnotationParser),
        ])
    }
}

impl AnnotationParser for ParserChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn parse(&self, annotation: &str) -> Option<DecisionCandidate> {
        self.rules
            .iter()
            .filter_map(|rule| rule.parse(annotation))
            .find(DecisionCandidate::is_well_formed)
    }
}

/// Parse every annotation, silently dropping the ones no rule accepts or
/// whose chosen option is not among the listed options.
pub fn parse_annotations(
    parser: &dyn AnnotationParser,
    annotations: &[String],
) -> Vec<DecisionCandidate> {
    annotations
        .iter()
        .filter_map(|text| match parser.parse(text) {
            Some(candidate) if candidate.is_well_formed() => Some(candidate),
            _ => {
                debug!(parser = parser.name(), "dropping unparseable annotation");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Decides whether a parsed decision needs human resolution.
pub trait ClassificationPolicy: Send + Sync {
    fn is_blocking(&self, candidate: &DecisionCandidate) -> bool;
}

/// Trusts the blocking hint carried by the annotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotatedClassification;

impl ClassificationPolicy for AnnotatedClassification {
    fn is_blocking(&self, candidate: &DecisionCandidate) -> bool {
        candidate.blocking
    }
}

/// Treats every decision as speculative (speculative tournament mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct AllSpeculative;

impl ClassificationPolicy for AllSpeculative {
    fn is_blocking(&self, _candidate: &DecisionCandidate) -> bool {
        false
    }
}
