// Text normalization — canonicalizes raw text before scoring.
//
// The normalized form is used only by the classifier; the original text is
// what gets persisted, mention-scanned, and displayed. Transformations are
// applied in a fixed order:
//
//   1. lowercase
//   2. collapse runs of the same letter beyond 2 down to 2 ("sooooo" -> "soo")
//   3. join single letters separated by one non-letter each when they spell
//      a lexicon term ("F U C K" / "f.u.c.k" -> "fuck")
//   4. per-token recovery: leetspeak mapping (0->o 1->i 3->e 4->a 5->s 7->t)
//      and double-letter squeeze, each applied only when the rewritten token
//      is a lexicon term and the original is not — never unconditionally
//
// Normalizing twice yields the same result as normalizing once: every
// rewrite produces either the original token or a lexicon word, and lexicon
// words are fixed points of all four steps.

use super::lexicon::Lexicon;

/// Canonicalize `text` for scoring against `lexicon`.
pub fn normalize(text: &str, lexicon: &Lexicon) -> String {
    let lowered = text.to_lowercase();
    let collapsed = collapse_repeats(&lowered);
    let joined = join_spaced_letters(&collapsed, lexicon);
    recover_tokens(&joined, lexicon)
}

/// Collapse runs of the same letter beyond 2 into exactly 2.
/// Non-letters are left alone.
fn collapse_repeats(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last: Option<char> = None;
    let mut run = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() && last == Some(c) {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 1;
        }
        last = Some(c);
        out.push(c);
    }
    out
}

/// Join runs of 3+ single letters, each separated by exactly one non-letter
/// character, when the joined word is a lexicon term. "F U C K this" becomes
/// "fuck this"; "i a m" stays as-is because "iam" is not an entry.
fn join_spaced_letters(text: &str, lexicon: &Lexicon) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if is_lone_letter(&chars, i) {
            let mut letters = vec![chars[i]];
            let mut j = i + 1;
            while j + 1 < chars.len()
                && is_separator(chars[j])
                && is_lone_letter(&chars, j + 1)
            {
                letters.push(chars[j + 1]);
                j += 2;
            }
            if letters.len() >= 3 {
                let joined: String = letters.iter().collect();
                if lexicon.contains_term(&joined) {
                    out.push_str(&joined);
                    i = j;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn is_separator(c: char) -> bool {
    !c.is_alphanumeric()
}

/// A letter with no alphanumeric neighbor on either side.
fn is_lone_letter(chars: &[char], i: usize) -> bool {
    chars[i].is_alphabetic()
        && (i == 0 || !chars[i - 1].is_alphanumeric())
        && (i + 1 == chars.len() || !chars[i + 1].is_alphanumeric())
}

/// Per-token conditional rewrites: leetspeak mapping and double-letter
/// squeeze. Both only fire when they turn a non-entry into a lexicon term,
/// so "v1" or "good" pass through untouched.
fn recover_tokens(text: &str, lexicon: &Lexicon) -> String {
    let mut out = String::with_capacity(text.len());
    let mut token = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            token.push(c);
        } else {
            flush_token(&mut out, &mut token, lexicon);
            out.push(c);
        }
    }
    flush_token(&mut out, &mut token, lexicon);
    out
}

fn flush_token(out: &mut String, token: &mut String, lexicon: &Lexicon) {
    if token.is_empty() {
        return;
    }
    if !lexicon.contains_term(token) {
        let mapped = deleet(token);
        if mapped != *token && lexicon.contains_term(&mapped) {
            out.push_str(&mapped);
            token.clear();
            return;
        }
        let squeezed = squeeze_doubles(token);
        if squeezed != *token && lexicon.contains_term(&squeezed) {
            out.push_str(&squeezed);
            token.clear();
            return;
        }
    }
    out.push_str(token);
    token.clear();
}

/// Map common digit substitutions back to letters.
fn deleet(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '0' => 'o',
            '1' => 'i',
            '3' => 'e',
            '4' => 'a',
            '5' => 's',
            '7' => 't',
            other => other,
        })
        .collect()
}

/// Reduce every doubled letter to a single one ("fuuck" -> "fuck").
fn squeeze_doubles(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut last = None;
    for c in token.chars() {
        if last != Some(c) {
            out.push(c);
        }
        last = Some(c);
    }
    out
}
