//! Threshold gate for the mention-edge job.
//!
//! A total passes when every watched component is at least `min`. During the
//! combine phase a passing partial may be emitted early as a provisional
//! signal; the authoritative decision is always the same test applied to the
//! fully reduced total. With non-negative contributions a passing total keeps
//! passing, so a provisional signal is never contradicted by later merges.

use crate::accumulate::{Counter, FeatureVector};
use ahash::AHashSet;

#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdGate<T: Counter = i64> {
    components: Vec<usize>,
    min: T,
}

impl<T: Counter> ThresholdGate<T> {
    pub fn new(components: impl Into<Vec<usize>>, min: T) -> Self {
        Self { components: components.into(), min }
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn components(&self) -> &[usize] {
        &self.components
    }

    /// True iff every watched component exists and is `>= min`.
    pub fn passes(&self, total: &FeatureVector<T>) -> bool {
        self.components
            .iter()
            .all(|&i| total.get(i).map_or(false, |v| v >= self.min))
    }
}

impl ThresholdGate<i64> {
    /// Both directions of an edge, each at least `min`.
    pub fn bidirectional(min: i64) -> Self {
        Self::new(vec![0, 1], min)
    }
}

/// Per-combiner view of the gate: remembers which keys already fired so a
/// key is signalled once per combine buffer rather than on every fold.
#[derive(Debug)]
pub struct ProvisionalTracker<'g, T: Counter = i64> {
    gate: &'g ThresholdGate<T>,
    fired: AHashSet<String>,
}

impl<'g, T: Counter> ProvisionalTracker<'g, T> {
    pub fn new(gate: &'g ThresholdGate<T>) -> Self {
        Self { gate, fired: AHashSet::new() }
    }

    /// Call after each fold with the key's running partial. Returns true the
    /// first time that partial passes the gate.
    pub fn observe(&mut self, key: &str, partial: &FeatureVector<T>) -> bool {
        if self.fired.contains(key) || !self.gate.passes(partial) {
            return false;
        }
        self.fired.insert(key.to_string());
        true
    }

    /// Forget fired keys once their partials have been spilled.
    pub fn reset(&mut self) {
        self.fired.clear();
    }
}
