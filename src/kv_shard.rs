//! Shuffle stage: partial totals routed to on-disk shards by key hash, then
//! each shard reduced to final totals independently.

use crate::accumulate::{Counter, FeatureVector, KeyedAccumulator};
use crate::util::create_with_backoff;
use ahash::RandomState;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs::{self, File};
use std::hash::{BuildHasher, Hash, Hasher};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Sharded key -> partial-vector writer. Lines are `key\tv1,v2,...`.
pub struct ShardedKVWriter<T: Counter = i64> {
    base_dir: PathBuf,
    shards: Vec<Mutex<BufWriter<File>>>,
    count: usize,
    state: RandomState,
    written: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

/// Result of reducing every shard.
#[derive(Debug, Default)]
pub struct ReduceOutcome {
    /// Per-shard outputs in shard order, each sorted by key.
    pub parts: Vec<PathBuf>,
    pub keys_reduced: u64,
    pub emitted: u64,
}

/// Seeds fixed so a key lands on the same shard in every run.
fn shard_hasher() -> RandomState {
    RandomState::with_seeds(
        0x0123_4567_89ab_cdef,
        0xfedc_ba98_7654_3210,
        0xcafe_babe_dead_beef,
        0xface_feed_0bad_f00d,
    )
}

fn shard_name(i: usize) -> String {
    format!("kv_{:04}.tmp", i)
}

impl<T: Counter> ShardedKVWriter<T> {
    pub fn create(work_dir: &Path, prefix: &str, count: usize, write_buf: usize) -> Result<Self> {
        let count = count.max(1);
        let dir = work_dir.join(format!("{prefix}_kv_shards"));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let mut shards = Vec::with_capacity(count);
        for i in 0..count {
            let p = dir.join(shard_name(i));
            let f = create_with_backoff(&p, 16, 50).with_context(|| format!("create {}", p.display()))?;
            shards.push(Mutex::new(BufWriter::with_capacity(write_buf, f)));
        }
        Ok(Self {
            base_dir: dir,
            shards,
            count,
            state: shard_hasher(),
            written: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn shard_index(&self, k: &str) -> usize {
        let mut h = self.state.build_hasher();
        k.hash(&mut h);
        (h.finish() as usize) % self.count
    }

    pub fn write_partial(&self, key: &str, v: &FeatureVector<T>) -> Result<()> {
        if key.contains(['\t', '\n']) {
            return Err(anyhow!("key {key:?} contains a tab or newline"));
        }
        let idx = self.shard_index(key);
        let mut w = self.shards[idx].lock();
        w.write_all(key.as_bytes())?;
        w.write_all(b"\t")?;
        w.write_all(v.to_csv().as_bytes())?;
        w.write_all(b"\n")?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Partials written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn flush_all(&self) -> Result<()> {
        for w in &self.shards { w.lock().flush()?; }
        Ok(())
    }

    /// Merge each key's partials exactly once, then hand the total to
    /// `finalize`; a `Some(payload)` is written as `key,payload`. Shards are
    /// reduced in parallel, each into `<out_dir>/kv_NNNN.tsv`.
    pub fn reduce<F>(self, out_dir: &Path, write_buf: usize, finalize: F) -> Result<ReduceOutcome>
    where
        F: Fn(&str, FeatureVector<T>) -> Option<String> + Sync,
    {
        self.flush_all()?;
        let ShardedKVWriter { base_dir, shards, count, .. } = self;
        drop(shards);

        fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
        let ins: Vec<PathBuf> = (0..count).map(|i| base_dir.join(shard_name(i))).collect();

        let results: Vec<(PathBuf, u64, u64)> = ins
            .par_iter()
            .enumerate()
            .map(|(i, p)| -> Result<(PathBuf, u64, u64)> {
                let out = out_dir.join(format!("kv_{:04}.tsv", i));
                let (keys, emitted) = reduce_shard::<T, _>(p, &out, write_buf, &finalize)?;
                Ok((out, keys, emitted))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut outcome = ReduceOutcome::default();
        for (p, keys, emitted) in results {
            outcome.parts.push(p);
            outcome.keys_reduced += keys;
            outcome.emitted += emitted;
        }
        if let Err(e) = fs::remove_dir_all(&base_dir) {
            tracing::warn!(dir = %base_dir.display(), error = %e, "could not remove shard dir");
        }
        Ok(outcome)
    }
}

fn reduce_shard<T, F>(input: &Path, output: &Path, write_buf: usize, finalize: &F) -> Result<(u64, u64)>
where
    T: Counter,
    F: Fn(&str, FeatureVector<T>) -> Option<String>,
{
    let mut acc: KeyedAccumulator<T> = KeyedAccumulator::with_capacity(64_000);
    let r = BufReader::new(File::open(input).with_context(|| format!("open {}", input.display()))?);
    for (lineno, line) in r.lines().enumerate() {
        let line = line?;
        if line.is_empty() { continue; }
        let (k, v) = line
            .split_once('\t')
            .ok_or_else(|| anyhow!("{}:{}: missing tab", input.display(), lineno + 1))?;
        let v = FeatureVector::<T>::parse_csv(v)
            .ok_or_else(|| anyhow!("{}:{}: bad vector {v:?}", input.display(), lineno + 1))?;
        acc.accumulate(k, v)?;
    }

    let keys = acc.len() as u64;
    let mut emitted = 0u64;
    let mut w = BufWriter::with_capacity(write_buf, create_with_backoff(output, 16, 50)?);
    for (k, total) in acc.into_sorted() {
        if let Some(payload) = finalize(&k, total) {
            w.write_all(k.as_bytes())?;
            w.write_all(b",")?;
            w.write_all(payload.as_bytes())?;
            w.write_all(b"\n")?;
            emitted += 1;
        }
    }
    w.flush()?;
    Ok((keys, emitted))
}
