use crate::filters::RecordFilter;
use std::path::{Path, PathBuf};

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct JobOptions {
    pub input_dir: PathBuf,           // decrypted NDJSON / .zst corpus
    pub work_dir: Option<PathBuf>,    // if None, create in input_dir/.tetl_work/
    pub parallelism: Option<usize>,   // Some(N) to set rayon threads, None to use default
    pub file_concurrency: usize,      // input files mapped concurrently
    pub shard_count: usize,           // shuffle partitions
    pub combine_buffer_keys: usize,   // distinct keys a combiner holds before spilling
    pub low_memory_frac: f64,         // spill early below this available-RAM fraction
    pub progress: bool,
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,

    pub filter: RecordFilter,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data"),
            work_dir: None,
            parallelism: None,
            file_concurrency: 4,
            shard_count: 64,
            combine_buffer_keys: 100_000,
            low_memory_frac: 0.10,
            progress: true,
            progress_label: None,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,

            filter: RecordFilter::default(),
        }
    }
}

impl JobOptions {
    pub fn with_input_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.input_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }
    pub fn with_file_concurrency(mut self, n: usize) -> Self {
        self.file_concurrency = n.max(1);
        self
    }
    pub fn with_shard_count(mut self, shards: usize) -> Self {
        self.shard_count = shards.max(1);
        self
    }
    /// 1 disables combining: every fold spills straight to the shuffle.
    pub fn with_combine_buffer_keys(mut self, keys: usize) -> Self {
        self.combine_buffer_keys = keys.max(1);
        self
    }
    pub fn with_low_memory_frac(mut self, frac: f64) -> Self {
        self.low_memory_frac = frac.clamp(0.0, 1.0);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    pub fn with_record_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }
}
