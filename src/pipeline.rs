use crate::combine::{Combiner, ProvisionalSink};
use crate::config::JobOptions;
use crate::counting::{CounterSnapshot, JobCounters};
use crate::filters::RecordFilter;
use crate::jobs::Job;
use crate::kv_shard::ShardedKVWriter;
use crate::paths::{discover_inputs, FileJob};
use crate::progress::make_count_progress;
use crate::record::{parse_record, RecordView};
use crate::stitch::{concat_parts, sibling_with_suffix};
use crate::tokens::{Tokenizer, WhitespaceTokenizer};
use crate::util::init_tracing_once;
use crate::zstd_jsonl::for_each_line_cfg;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct TweetETL {
    pub(crate) opts: JobOptions,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Default for TweetETL {
    fn default() -> Self {
        Self::new()
    }
}

/// What one job run did.
#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub job: String,
    /// Input files planned, before the file-level date gate.
    pub files_planned: usize,
    pub counters: CounterSnapshot,
    /// Partial totals written to the shuffle.
    pub partials_shuffled: u64,
    pub keys_reduced: u64,
    pub emitted: u64,
    pub output: PathBuf,
    pub provisional_output: PathBuf,
}

/// Everything a map worker borrows.
struct MapContext<'a> {
    job: &'a dyn Job,
    opts: &'a JobOptions,
    tokenizer: &'a dyn Tokenizer,
    shuffle: &'a ShardedKVWriter<i64>,
    provisional: &'a ProvisionalSink,
    counters: &'a JobCounters,
    pb: Option<&'a ProgressBar>,
}

impl TweetETL {
    pub fn new() -> Self {
        Self { opts: JobOptions::default(), tokenizer: Arc::new(WhitespaceTokenizer) }
    }

    // -------- Builder methods --------
    pub fn input_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_input_dir(dir); self }
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_work_dir(dir); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn file_concurrency(mut self, n: usize) -> Self { self.opts = self.opts.with_file_concurrency(n); self }
    pub fn shard_count(mut self, count: usize) -> Self { self.opts = self.opts.with_shard_count(count); self }
    pub fn combine_buffer_keys(mut self, keys: usize) -> Self { self.opts = self.opts.with_combine_buffer_keys(keys); self }
    pub fn low_memory_frac(mut self, frac: f64) -> Self { self.opts = self.opts.with_low_memory_frac(frac); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }
    pub fn record_filter(mut self, filter: RecordFilter) -> Self { self.opts = self.opts.with_record_filter(filter); self }
    pub fn tokenizer(mut self, t: impl Tokenizer + 'static) -> Self { self.tokenizer = Arc::new(t); self }

    pub fn options(&self) -> &JobOptions {
        &self.opts
    }

    /// Run `job` over every input file and write its emitted totals, sorted by
    /// key within each shard, to `out_path` as `key,v1,...,vN` lines.
    /// Early gate passes go to `<out_path>.provisional`.
    pub fn run_job(&self, job: &dyn Job, out_path: &Path) -> Result<JobReport> {
        init_tracing_once();
        if let Some(n) = self.opts.parallelism { if n > 0 { rayon::ThreadPoolBuilder::new().num_threads(n).build_global().ok(); } }

        let work_dir = self.ensure_work_dir()?;
        let job_dir = work_dir.join(format!("{}_job", job.name()));
        if job_dir.exists() {
            fs::remove_dir_all(&job_dir).with_context(|| format!("clear {}", job_dir.display()))?;
        }
        fs::create_dir_all(&job_dir)?;

        let planned = discover_inputs(&self.opts.input_dir)
            .with_context(|| format!("discover inputs under {}", self.opts.input_dir.display()))?;
        let counters = JobCounters::default();
        let files = self.gate_files(planned.clone(), &counters);
        if files.is_empty() {
            tracing::warn!("No input files found. Check input_dir and the date window.");
        } else {
            tracing::info!(job = job.name(), files = files.len(), skipped = planned.len() - files.len(), "planned input files");
        }

        let shuffle = ShardedKVWriter::<i64>::create(&job_dir, job.name(), self.opts.shard_count, self.opts.write_buffer_bytes)?;
        let provisional_path = sibling_with_suffix(out_path, ".provisional");
        if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let provisional = ProvisionalSink::create(&provisional_path)?;

        let pb = if self.opts.progress {
            let label = self.opts.progress_label.clone().unwrap_or_else(|| format!("map {}", job.name()));
            Some(make_count_progress(files.len() as u64, &label))
        } else {
            None
        };

        let ctx = MapContext {
            job,
            opts: &self.opts,
            tokenizer: self.tokenizer.as_ref(),
            shuffle: &shuffle,
            provisional: &provisional,
            counters: &counters,
            pb: pb.as_ref(),
        };
        crate::concurrency::for_each_file_limited(&files, self.opts.file_concurrency, |file| {
            map_file(&ctx, file).with_context(|| format!("processing {}", file.path.display()))
        })?;
        if let Some(pb) = &pb { pb.finish_with_message("mapped"); }
        provisional.flush()?;

        let partials_shuffled = shuffle.written();
        let reduced_dir = job_dir.join("reduced");
        let outcome = shuffle.reduce(&reduced_dir, self.opts.write_buffer_bytes, |key, total| job.finalize(key, total))?;
        concat_parts(&outcome.parts, out_path, self.opts.write_buffer_bytes)
            .with_context(|| format!("write {}", out_path.display()))?;
        if let Err(e) = fs::remove_dir_all(&job_dir) {
            tracing::warn!(dir = %job_dir.display(), error = %e, "could not remove job work dir");
        }

        let report = JobReport {
            job: job.name().to_string(),
            files_planned: planned.len(),
            counters: counters.snapshot(),
            partials_shuffled,
            keys_reduced: outcome.keys_reduced,
            emitted: outcome.emitted,
            output: out_path.to_path_buf(),
            provisional_output: provisional_path,
        };
        tracing::info!(
            job = %report.job,
            records = report.counters.records_read,
            mapped = report.counters.records_mapped,
            rejected = report.counters.records_rejected(),
            malformed = report.counters.records_malformed,
            keys = report.keys_reduced,
            emitted = report.emitted,
            provisional = report.counters.provisional,
            "job finished"
        );
        Ok(report)
    }

    /// Drop files whose bucket date lies outside the record window.
    fn gate_files(&self, planned: Vec<FileJob>, counters: &JobCounters) -> Vec<FileJob> {
        let window = &self.opts.filter.window;
        planned
            .into_iter()
            .filter(|f| match f.bucket_date {
                Some(d) if !window.contains_date(d) => {
                    tracing::debug!(path = %f.path.display(), date = %d, "file outside date window");
                    JobCounters::inc(&counters.files_date_invalid);
                    false
                }
                _ => true,
            })
            .collect()
    }

    pub(crate) fn ensure_work_dir(&self) -> Result<PathBuf> {
        let dir = self.opts.work_dir.clone().unwrap_or_else(|| self.opts.input_dir.join(".tetl_work"));
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        Ok(dir)
    }
}

fn map_file(ctx: &MapContext<'_>, file: &FileJob) -> Result<()> {
    let counters = ctx.counters;
    let mut combiner = Combiner::new(
        ctx.job.width(),
        ctx.opts.combine_buffer_keys,
        ctx.opts.low_memory_frac,
        ctx.job.gate(),
        ctx.shuffle,
        ctx.provisional,
        counters,
    );

    let read = for_each_line_cfg(file, ctx.opts.read_buffer_bytes, |line| {
        JobCounters::inc(&counters.records_read);
        let rec = match parse_record(line) {
            Ok(r) => r,
            Err(e) => {
                JobCounters::inc(&counters.records_malformed);
                tracing::debug!(path = %file.path.display(), error = %e, "malformed record");
                return Ok(());
            }
        };
        let (author, published) = match ctx.opts.filter.admit(&rec) {
            Ok(v) => v,
            Err(why) => {
                counters.reject(why);
                tracing::debug!(?why, "record rejected");
                return Ok(());
            }
        };
        let view = RecordView::new(&rec, author, published, ctx.tokenizer);
        let emissions = match ctx.job.map(&view) {
            Ok(v) => v,
            Err(e) => {
                JobCounters::inc(&counters.extract_failed);
                tracing::debug!(author = %view.author, error = %e, "feature extraction failed");
                return Ok(());
            }
        };
        JobCounters::inc(&counters.records_mapped);
        JobCounters::add(&counters.vectors_emitted, emissions.len() as u64);
        for (key, v) in emissions {
            combiner.fold(&key, v)?;
        }
        Ok(())
    })?;
    combiner.finish()?;

    JobCounters::inc(&counters.files_read);
    if read.truncated {
        JobCounters::inc(&counters.files_truncated);
    }
    if let Some(pb) = ctx.pb { pb.inc(1); }
    Ok(())
}
