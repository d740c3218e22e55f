//! Keyed aggregation over fixed-shape feature vectors.
//!
//! `FeatureVector` with componentwise addition is a commutative monoid (the
//! all-zero vector of the same width is the identity). Combine rounds may run
//! any number of times per key before the single final reduction, so the only
//! thing that may depend on grouping is *when* a total is known, never *what*
//! it is. Merging vectors of different widths is a schema error; nothing is
//! truncated or padded.

use crate::error::SchemaError;
use ahash::AHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

/// Numeric component type of a feature vector.
pub trait Counter:
    Copy + Default + PartialOrd + AddAssign + fmt::Debug + fmt::Display + FromStr + Send + Sync + Serialize + DeserializeOwned + 'static
{
    fn as_f64(self) -> f64;
}

impl Counter for i64 {
    fn as_f64(self) -> f64 { self as f64 }
}
impl Counter for u64 {
    fn as_f64(self) -> f64 { self as f64 }
}
impl Counter for f64 {
    fn as_f64(self) -> f64 { self }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound = "T: Counter")]
pub struct FeatureVector<T: Counter = i64> {
    values: Vec<T>,
}

impl<T: Counter> FeatureVector<T> {
    pub fn new(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Identity element for vectors of `width` components.
    pub fn zeros(width: usize) -> Self {
        Self { values: vec![T::default(); width] }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<T> {
        self.values.get(idx).copied()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.values
    }

    /// Componentwise `self += other`.
    pub fn merge(&mut self, other: &Self) -> Result<(), SchemaError> {
        if self.values.len() != other.values.len() {
            return Err(SchemaError::LengthMismatch { left: self.values.len(), right: other.values.len() });
        }
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
        Ok(())
    }

    /// By-value form of [`merge`](FeatureVector::merge).
    pub fn merged(mut self, other: &Self) -> Result<Self, SchemaError> {
        self.merge(other)?;
        Ok(self)
    }

    /// Comma-joined components, the payload half of an output line.
    pub fn to_csv(&self) -> String {
        join_values(&self.values)
    }

    /// Inverse of [`to_csv`](FeatureVector::to_csv).
    pub fn parse_csv(s: &str) -> Option<Self> {
        if s.is_empty() {
            return Some(Self::new(Vec::new()));
        }
        s.split(',')
            .map(|p| p.trim().parse::<T>().ok())
            .collect::<Option<Vec<T>>>()
            .map(Self::new)
    }
}

impl<T: Counter> From<Vec<T>> for FeatureVector<T> {
    fn from(values: Vec<T>) -> Self {
        Self::new(values)
    }
}

pub(crate) fn join_values<T: fmt::Display>(values: &[T]) -> String {
    let mut out = String::with_capacity(values.len() * 4);
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out
}

/// Running per-key totals. A key's state is created on first observation and
/// updated by every later fold for that key.
#[derive(Clone, Debug)]
pub struct KeyedAccumulator<T: Counter = i64> {
    totals: AHashMap<String, FeatureVector<T>>,
}

impl<T: Counter> Default for KeyedAccumulator<T> {
    fn default() -> Self {
        Self { totals: AHashMap::new() }
    }
}

impl<T: Counter> KeyedAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { totals: AHashMap::with_capacity(n) }
    }

    /// Fold one vector (a record's features, or a partial total) into `key`'s
    /// running total and return the updated total.
    pub fn accumulate(&mut self, key: &str, v: FeatureVector<T>) -> Result<&FeatureVector<T>, SchemaError> {
        match self.totals.entry(key.to_string()) {
            Entry::Occupied(e) => {
                let total = e.into_mut();
                total.merge(&v).map_err(|err| err.for_key(key))?;
                Ok(total)
            }
            Entry::Vacant(e) => Ok(e.insert(v)),
        }
    }

    /// Merge another accumulator into this one (associative and commutative).
    /// Widths of shared keys are all checked first; on error `self` is unchanged.
    pub fn merge_from(&mut self, other: Self) -> Result<(), SchemaError> {
        for (k, v) in &other.totals {
            if let Some(total) = self.totals.get(k) {
                if total.width() != v.width() {
                    return Err(SchemaError::KeyLengthMismatch { key: k.clone(), left: total.width(), right: v.width() });
                }
            }
        }
        for (k, v) in other.totals {
            match self.totals.get_mut(&k) {
                Some(total) => total.merge(&v).map_err(|e| e.for_key(&k))?,
                None => {
                    self.totals.insert(k, v);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FeatureVector<T>> {
        self.totals.get(key)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Take all partial totals, leaving the accumulator empty.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, FeatureVector<T>)> + '_ {
        self.totals.drain()
    }

    /// Final totals sorted by key.
    pub fn into_sorted(self) -> Vec<(String, FeatureVector<T>)> {
        let mut v: Vec<_> = self.totals.into_iter().collect();
        v.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        v
    }
}
