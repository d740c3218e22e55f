//! Map-side combining.
//!
//! A `Combiner` folds one worker's emissions into local partial totals and
//! spills them to the shuffle when its buffer fills or memory runs low. How
//! often that happens is not under the job's control, so a key may be
//! combined zero, one, or many times before the final reduction.

use crate::accumulate::{FeatureVector, KeyedAccumulator};
use crate::counting::JobCounters;
use crate::error::SchemaError;
use crate::gate::{ProvisionalTracker, ThresholdGate};
use crate::kv_shard::ShardedKVWriter;
use crate::mem::is_low_memory;
use crate::util::create_with_backoff;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Folds between memory probes.
const MEM_PROBE_EVERY: u64 = 1024;

/// Shared `<output>.provisional` writer: one `key,v1,...` line per early
/// gate pass. Lines are signals only; the final output is authoritative.
pub struct ProvisionalSink {
    path: PathBuf,
    w: Mutex<BufWriter<File>>,
}

impl ProvisionalSink {
    pub fn create(path: &Path) -> Result<Self> {
        let f = create_with_backoff(path, 16, 50).with_context(|| format!("create {}", path.display()))?;
        Ok(Self { path: path.to_path_buf(), w: Mutex::new(BufWriter::new(f)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, key: &str, partial: &FeatureVector<i64>) -> Result<()> {
        let mut w = self.w.lock();
        w.write_all(key.as_bytes())?;
        w.write_all(b",")?;
        w.write_all(partial.to_csv().as_bytes())?;
        w.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.w.lock().flush()?;
        Ok(())
    }
}

pub struct Combiner<'a> {
    acc: KeyedAccumulator<i64>,
    width: usize,
    capacity: usize,
    low_memory_frac: f64,
    folds: u64,
    tracker: Option<ProvisionalTracker<'a, i64>>,
    shuffle: &'a ShardedKVWriter<i64>,
    provisional: &'a ProvisionalSink,
    counters: &'a JobCounters,
}

impl<'a> Combiner<'a> {
    pub fn new(
        width: usize,
        capacity: usize,
        low_memory_frac: f64,
        gate: Option<&'a ThresholdGate<i64>>,
        shuffle: &'a ShardedKVWriter<i64>,
        provisional: &'a ProvisionalSink,
        counters: &'a JobCounters,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            acc: KeyedAccumulator::with_capacity(capacity.min(64 * 1024)),
            width,
            capacity,
            low_memory_frac,
            folds: 0,
            tracker: gate.map(ProvisionalTracker::new),
            shuffle,
            provisional,
            counters,
        }
    }

    /// Fold one emission. A vector whose width differs from the job's schema
    /// is a fatal error.
    pub fn fold(&mut self, key: &str, v: FeatureVector<i64>) -> Result<()> {
        if v.width() != self.width {
            return Err(SchemaError::KeyLengthMismatch { key: key.to_string(), left: self.width, right: v.width() }.into());
        }
        let total = self.acc.accumulate(key, v)?;
        if let Some(tracker) = self.tracker.as_mut() {
            if tracker.observe(key, total) {
                tracing::debug!(key, partial = %total.to_csv(), "provisional gate pass");
                self.provisional.record(key, total)?;
                JobCounters::inc(&self.counters.provisional);
            }
        }

        self.folds += 1;
        let low_mem = self.folds % MEM_PROBE_EVERY == 0 && is_low_memory(self.low_memory_frac);
        if self.acc.len() >= self.capacity || low_mem {
            if low_mem {
                tracing::debug!(keys = self.acc.len(), "low memory, spilling combiner early");
            }
            self.spill()?;
        }
        Ok(())
    }

    /// Send every partial to the shuffle and start over.
    pub fn spill(&mut self) -> Result<()> {
        if self.acc.is_empty() {
            return Ok(());
        }
        for (k, v) in self.acc.drain() {
            self.shuffle.write_partial(&k, &v)?;
        }
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.reset();
        }
        JobCounters::inc(&self.counters.combine_spills);
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.spill()
    }
}
