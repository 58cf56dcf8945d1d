// Rule-based toxicity scoring over the normalized text.
//
// Phrases are matched first on token windows and consume their tokens, so
// "piece of shit" counts once as severe rather than once as a phrase plus
// once for "shit". Single-term matches follow. Weights compound additively
// by severity tier and saturate at 1.0, which keeps the score monotone:
// adding a flagged term can never lower it.
//
// Flagged terms carry the span as it appeared in the submitted text where
// it can still be found there (case preserved); for obfuscated matches the
// normalized form is reported instead.

use serde::{Deserialize, Serialize};

use super::lexicon::{Lexicon, Severity};

/// A lexicon match, reported back to the caller on a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedTerm {
    pub term: String,
    pub severity: Severity,
}

/// Coarse sentiment label derived from the scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one scoring pass.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Accumulated weight, clamped to [0, 1]
    pub score: f64,
    pub sentiment: Sentiment,
    /// Matches in the order they appear in the text
    pub flagged: Vec<FlaggedTerm>,
}

/// How much a mitigating qualifier ("not", "no", "never") immediately before
/// a flagged term scales its weight down.
const QUALIFIER_DISCOUNT: f64 = 0.5;

/// Score `normalized` against the lexicon. `raw` is the submitted text,
/// used only to report flagged spans with their original casing.
pub fn classify(raw: &str, normalized: &str, lexicon: &Lexicon) -> Classification {
    let tokens: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let mut score = 0.0;
    let mut flagged = Vec::new();
    let mut positive_hits = 0u32;
    let mut consumed = vec![false; tokens.len()];

    // Phrase pass: longest phrases first so "hate all of you" wins over
    // any shorter overlapping entry.
    let mut phrases: Vec<&(Vec<String>, Severity)> = lexicon.phrases().iter().collect();
    phrases.sort_by_key(|(tokens, _)| std::cmp::Reverse(tokens.len()));
    for (phrase, severity) in phrases {
        let len = phrase.len();
        if len == 0 || len > tokens.len() {
            continue;
        }
        for start in 0..=(tokens.len() - len) {
            if consumed[start..start + len].iter().any(|c| *c) {
                continue;
            }
            if tokens[start..start + len]
                .iter()
                .zip(phrase.iter())
                .all(|(tok, expected)| *tok == expected.as_str())
            {
                let discounted = start > 0 && lexicon.is_qualifier(tokens[start - 1]);
                score += apply_discount(lexicon.weight(*severity), discounted);
                flagged.push(FlaggedTerm {
                    term: original_span(raw, &phrase.join(" ")),
                    severity: *severity,
                });
                consumed[start..start + len].iter_mut().for_each(|c| *c = true);
            }
        }
    }

    // Single-term pass over whatever the phrases left behind.
    for (idx, token) in tokens.iter().enumerate() {
        if consumed[idx] {
            continue;
        }
        if let Some(severity) = lexicon.term_severity(token) {
            let discounted = idx > 0 && !consumed[idx - 1] && lexicon.is_qualifier(tokens[idx - 1]);
            score += apply_discount(lexicon.weight(severity), discounted);
            flagged.push(FlaggedTerm {
                term: original_span(raw, token),
                severity,
            });
        } else if lexicon.is_positive(token) {
            positive_hits += 1;
        }
    }

    let score = score.clamp(0.0, 1.0);
    let sentiment = if !flagged.is_empty() && score >= lexicon.weights().negative_floor {
        Sentiment::Negative
    } else if positive_hits > 0 {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    };

    Classification {
        score,
        sentiment,
        flagged,
    }
}

fn apply_discount(weight: f64, discounted: bool) -> f64 {
    if discounted {
        weight * QUALIFIER_DISCOUNT
    } else {
        weight
    }
}

/// Find `matched` (a lowercase lexicon span) in the submitted text and
/// return it with its original casing. Falls back to the normalized form
/// when the span only exists post-normalization (obfuscated input).
fn original_span(raw: &str, matched: &str) -> String {
    let needle: Vec<char> = matched.chars().collect();
    let haystack: Vec<(usize, char)> = raw.char_indices().collect();
    if needle.is_empty() || haystack.len() < needle.len() {
        return matched.to_string();
    }
    for start in 0..=(haystack.len() - needle.len()) {
        let hit = needle.iter().enumerate().all(|(k, nc)| {
            let (_, hc) = haystack[start + k];
            hc.to_lowercase().eq(nc.to_lowercase())
        });
        if hit {
            let (begin, _) = haystack[start];
            let end = haystack
                .get(start + needle.len())
                .map(|(i, _)| *i)
                .unwrap_or(raw.len());
            return raw[begin..end].to_string();
        }
    }
    matched.to_string()
}
