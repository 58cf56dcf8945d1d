// The moderation gate — the validate-or-block checkpoint every piece of
// free-text user content passes before persistence or mention scanning.
//
// Pure with respect to storage: the gate normalizes, classifies, and
// compares against the block threshold. Callers must not persist or
// forward text that came back blocked.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::classifier::{classify, FlaggedTerm, Sentiment};
use super::lexicon::Lexicon;
use super::normalize::normalize;

/// Raised when a submission's toxicity score crosses the block threshold.
/// Recoverable: surface the score and flagged terms to the submitter and
/// persist nothing.
#[derive(Debug, Clone, Error)]
#[error("content blocked by moderation (score {score:.2})")]
pub struct ContentBlocked {
    pub score: f64,
    pub flagged_terms: Vec<FlaggedTerm>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pass => "pass",
            Decision::Block => "block",
        }
    }
}

/// Full scoring outcome for one submission. Transient — never persisted.
#[derive(Debug, Clone)]
pub struct ModerationVerdict {
    pub score: f64,
    pub sentiment: Sentiment,
    pub flagged_terms: Vec<FlaggedTerm>,
    pub decision: Decision,
}

pub struct ModerationGate {
    lexicon: Arc<Lexicon>,
}

impl ModerationGate {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// Score `text` without enforcing the threshold. Useful for admin
    /// tooling that wants to inspect a verdict either way.
    pub fn verdict(&self, text: &str) -> ModerationVerdict {
        let normalized = normalize(text, &self.lexicon);
        let result = classify(text, &normalized, &self.lexicon);
        let decision = if result.score >= self.lexicon.weights().block_threshold {
            Decision::Block
        } else {
            Decision::Pass
        };
        ModerationVerdict {
            score: result.score,
            sentiment: result.sentiment,
            flagged_terms: result.flagged,
            decision,
        }
    }

    /// Gate `text`: Ok on pass, `ContentBlocked` with the score and flagged
    /// terms otherwise.
    pub fn validate(&self, text: &str) -> Result<ModerationVerdict, ContentBlocked> {
        let verdict = self.verdict(text);
        match verdict.decision {
            Decision::Pass => Ok(verdict),
            Decision::Block => {
                debug!(
                    score = verdict.score,
                    terms = verdict.flagged_terms.len(),
                    "submission blocked"
                );
                Err(ContentBlocked {
                    score: verdict.score,
                    flagged_terms: verdict.flagged_terms,
                })
            }
        }
    }
}
