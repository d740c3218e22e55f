//! Token normalization and the tokenizer seam.
//!
//! Real tokenization (twitter-aware splitting) happens upstream. Records may
//! carry their own `tokens`; otherwise a `Tokenizer` implementation is used, and
//! `WhitespaceTokenizer` is only a stand-in for tests and simple corpora.

use crate::edge::EDGE_SEPARATOR;

/// Lowercase and strip leading `#` marks (hashtags match plain gazetteer words).
#[inline]
pub fn normalize_token(t: &str) -> String {
    t.trim_start_matches('#').to_lowercase()
}

/// Normalize a whole raw token stream, dropping tokens that become empty.
pub fn normalize_tokens<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .map(|t| normalize_token(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Mentioned handles: raw tokens starting with `@`, marker stripped, lowercased.
/// A handle that still contains `@` (e.g. `@alice@bob`) cannot form an edge key
/// and is dropped.
pub fn mentions<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    mentions_counted(raw).0
}

/// [`mentions`], plus the number of `@` tokens dropped for containing the edge
/// separator.
pub fn mentions_counted<S: AsRef<str>>(raw: &[S]) -> (Vec<String>, usize) {
    let mut dropped = 0;
    let handles = raw
        .iter()
        .filter_map(|t| t.as_ref().strip_prefix('@'))
        .filter(|m| !m.is_empty())
        .filter(|m| {
            let usable = !m.contains(EDGE_SEPARATOR);
            dropped += usize::from(!usable);
            usable
        })
        .map(|m| m.to_lowercase())
        .collect();
    (handles, dropped)
}

pub trait Tokenizer: Send + Sync {
    /// Split `text` into raw (un-normalized) tokens, keeping `@` and `#` marks.
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Splits on whitespace and trims surrounding punctuation, except the leading
/// `@`/`#` markers that mentions and hashtags depend on.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| {
                w.trim_start_matches(|c: char| c.is_ascii_punctuation() && c != '@' && c != '#')
                    .trim_end_matches(|c: char| c.is_ascii_punctuation())
            })
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    }
}
