//! Phrase matching: does any contiguous run of a token stream equal a
//! gazetteer phrase?
//!
//! For every start position the trie is walked one token at a time. The walk
//! stops at the first terminal node (shortest phrase starting there) or as soon
//! as a token has no child. Worst case O(n·L) with L the longest phrase.

use crate::gazetteer::GazetteerTrie;
use std::ops::Range;

/// Span of the first phrase found, scanning start positions left to right and
/// taking the shortest phrase at each start.
pub fn first_match<S: AsRef<str>>(tokens: &[S], trie: &GazetteerTrie) -> Option<Range<usize>> {
    for start in 0..tokens.len() {
        let mut node = trie.root();
        for (offset, tok) in tokens[start..].iter().enumerate() {
            match trie.child(node, tok.as_ref()) {
                Some(next) => node = next,
                None => break,
            }
            if trie.is_terminal(node) {
                return Some(start..start + offset + 1);
            }
        }
    }
    None
}

/// True iff some contiguous run of `tokens` is exactly a phrase in `trie`.
#[inline]
pub fn any_subsequence_matches<S: AsRef<str>>(tokens: &[S], trie: &GazetteerTrie) -> bool {
    first_match(tokens, trie).is_some()
}

/// True iff any of `tries` matches somewhere in `tokens`.
pub fn any_trie_matches<S: AsRef<str>>(tokens: &[S], tries: &[&GazetteerTrie]) -> bool {
    tries.iter().any(|t| any_subsequence_matches(tokens, t))
}
