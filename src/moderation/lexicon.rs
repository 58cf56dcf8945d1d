// Toxicity lexicon — the severity table the classifier scores against.
//
// The lexicon is loaded once and passed by reference into the normalizer and
// classifier. Nothing here is a singleton: tests build their own tables, and
// the weights/threshold are tunable constants, not fixed contracts.
//
// Common low-severity complaint idioms ("I hate Mondays") are excluded from
// the table entirely rather than discounted at runtime — negation heuristics
// are unreliable, so bare "hate" is not an entry; only directed phrases are.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Severity tier of a lexicon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configurable scoring weights and the block threshold.
///
/// Weights compound additively across flagged terms and saturate at 1.0.
/// The defaults are calibrated against the moderation test corpus: one
/// severe term alone (0.6) blocks, one moderate term alone (0.35) does not,
/// two moderate terms (0.70) do.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    /// Weight added per mild term (default 0.15)
    pub mild: f64,
    /// Weight added per moderate term (default 0.35)
    pub moderate: f64,
    /// Weight added per severe term (default 0.6)
    pub severe: f64,
    /// Score at or above this blocks the content (default 0.5)
    pub block_threshold: f64,
    /// Minimum score for a flagged text to be labeled negative (default 0.1)
    pub negative_floor: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            mild: 0.15,
            moderate: 0.35,
            severe: 0.6,
            block_threshold: 0.5,
            negative_floor: 0.1,
        }
    }
}

/// Immutable term table: single tokens, multi-token phrases, the
/// mitigating-qualifier allow-list, and a small positive-word counter set.
pub struct Lexicon {
    terms: HashMap<String, Severity>,
    /// Phrases as pre-split lowercase token sequences, matched on token
    /// windows of the normalized text. Checked before single terms so a
    /// phrase hit consumes its tokens.
    phrases: Vec<(Vec<String>, Severity)>,
    qualifiers: HashSet<String>,
    positive: HashSet<String>,
    weights: Weights,
}

impl Lexicon {
    pub fn new(
        terms: HashMap<String, Severity>,
        phrases: Vec<(Vec<String>, Severity)>,
        weights: Weights,
    ) -> Self {
        Self {
            terms,
            phrases,
            qualifiers: default_qualifiers(),
            positive: default_positive_words(),
            weights,
        }
    }

    /// The built-in table used in production.
    pub fn builtin() -> Self {
        let mut terms = HashMap::new();

        for word in ["dumb", "sucks", "crap", "jerk", "loser", "losers", "lame"] {
            terms.insert(word.to_string(), Severity::Mild);
        }
        for word in [
            "idiot", "idiots", "moron", "morons", "stupid", "shit", "bitch", "asshole",
            "bastard", "trash", "pathetic", "worthless",
        ] {
            terms.insert(word.to_string(), Severity::Moderate);
        }
        for word in ["fuck", "fucking", "fucked", "motherfucker", "cunt", "kys"] {
            terms.insert(word.to_string(), Severity::Severe);
        }

        let phrases = vec![
            phrase("hate you", Severity::Moderate),
            phrase("hate everyone", Severity::Moderate),
            phrase("hate all of you", Severity::Moderate),
            phrase("shut up", Severity::Mild),
            phrase("kill yourself", Severity::Severe),
            phrase("go die", Severity::Severe),
            phrase("piece of shit", Severity::Severe),
        ];

        Self::new(terms, phrases, Weights::default())
    }

    /// Override the block threshold (e.g. from PROCTOR_BLOCK_THRESHOLD).
    pub fn with_block_threshold(mut self, threshold: f64) -> Self {
        self.weights.block_threshold = threshold;
        self
    }

    pub fn term_severity(&self, token: &str) -> Option<Severity> {
        self.terms.get(token).copied()
    }

    pub fn contains_term(&self, token: &str) -> bool {
        self.terms.contains_key(token)
    }

    pub fn phrases(&self) -> &[(Vec<String>, Severity)] {
        &self.phrases
    }

    pub fn is_qualifier(&self, token: &str) -> bool {
        self.qualifiers.contains(token)
    }

    pub fn is_positive(&self, token: &str) -> bool {
        self.positive.contains(token)
    }

    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Mild => self.weights.mild,
            Severity::Moderate => self.weights.moderate,
            Severity::Severe => self.weights.severe,
        }
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }
}

fn phrase(text: &str, severity: Severity) -> (Vec<String>, Severity) {
    (
        text.split_whitespace().map(str::to_string).collect(),
        severity,
    )
}

/// Tokens that soften an immediately following flagged term ("not trash").
fn default_qualifiers() -> HashSet<String> {
    ["not", "no", "never"].iter().map(|s| s.to_string()).collect()
}

fn default_positive_words() -> HashSet<String> {
    [
        "great", "good", "love", "thanks", "thank", "awesome", "amazing", "happy",
        "excellent", "welcome", "congrats", "congratulations", "nice", "glad", "fun",
        "cool", "helpful",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
