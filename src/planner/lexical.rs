//! Cross-track word matching over vocal transcripts.

use crate::analyzer::features::{TimeWindow, VocalSegment};
use regex::Regex;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// A shared word linking an outgoing phrase end to an incoming phrase start.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalMatch {
    pub word: String,
    /// End of the outgoing segment containing the word.
    pub from_segment_end: f64,
    /// Start of the incoming segment containing the word.
    pub to_segment_start: f64,
    pub score: u8,
}

/// Lowercase word tokens longer than one character, punctuation stripped,
/// de-duplicated in first-occurrence order.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned = PUNCTUATION.replace_all(&text.to_lowercase(), "").into_owned();
    let mut words: Vec<String> = Vec::new();
    for w in cleaned.split_whitespace() {
        if w.chars().count() > 1 && !words.iter().any(|seen| seen == w) {
            words.push(w.to_string());
        }
    }
    words
}

/// Best-scoring pairing of an outgoing and an incoming segment sharing a word.
///
/// Score is `2` when the outgoing segment ends inside `outro` plus `1` when the
/// incoming segment starts inside `intro`. Candidates are visited outgoing
/// segment first, then that segment's words in order, then incoming segments;
/// a later candidate replaces the current best only with a strictly higher
/// score. Segments with non-finite times are skipped.
pub fn best_match(
    outgoing: &[VocalSegment],
    outro: TimeWindow,
    incoming: &[VocalSegment],
    intro: TimeWindow,
) -> Option<LexicalMatch> {
    let incoming_words: Vec<(&VocalSegment, Vec<String>)> = incoming
        .iter()
        .filter(|s| s.start.is_finite() && s.end.is_finite())
        .map(|s| (s, tokenize(&s.text)))
        .collect();

    let mut best: Option<LexicalMatch> = None;
    for a in outgoing.iter().filter(|s| s.start.is_finite() && s.end.is_finite()) {
        let a_score = if outro.contains(a.end) { 2 } else { 0 };
        for word in tokenize(&a.text) {
            for (b, b_words) in &incoming_words {
                if !b_words.contains(&word) {
                    continue;
                }
                let score = a_score + if intro.contains(b.start) { 1 } else { 0 };
                if best.as_ref().is_none_or(|m| score > m.score) {
                    best = Some(LexicalMatch {
                        word: word.clone(),
                        from_segment_end: a.end,
                        to_segment_start: b.start,
                        score,
                    });
                }
            }
        }
    }
    best
}
