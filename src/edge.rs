//! Canonical user-pair ("edge") keys.
//!
//! The key is the two handles sorted and joined by `@`, so A→B and B→A land on
//! the same key. Direction survives only in the vector: component 0 counts
//! observations made by the lexicographically smaller handle, component 1 those
//! made by the larger one.

use crate::accumulate::FeatureVector;

pub const EDGE_SEPARATOR: char = '@';

/// Sorted `min@max` key for a pair of handles.
pub fn edge_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut k = String::with_capacity(lo.len() + hi.len() + 1);
    k.push_str(lo);
    k.push(EDGE_SEPARATOR);
    k.push_str(hi);
    k
}

/// Key and directional weight for `source` mentioning `sink`.
/// Self-mentions carry no edge and yield `None`, as do handles containing the
/// separator: their key would collide with another pair's.
pub fn edge_observation(source: &str, sink: &str) -> Option<(String, FeatureVector<i64>)> {
    if source == sink || source.contains(EDGE_SEPARATOR) || sink.contains(EDGE_SEPARATOR) {
        return None;
    }
    let weight = if source < sink { vec![1, 0] } else { vec![0, 1] };
    Some((edge_key(source, sink), FeatureVector::new(weight)))
}

/// Split a key produced by [`edge_key`] back into its two handles. Keys with
/// more than one separator never come from [`edge_observation`] and yield `None`.
pub fn split_edge_key(key: &str) -> Option<(&str, &str)> {
    let (lo, hi) = key.split_once(EDGE_SEPARATOR)?;
    if hi.contains(EDGE_SEPARATOR) {
        return None;
    }
    Some((lo, hi))
}
