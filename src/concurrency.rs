//! Concurrency helper: bound how many input files are mapped at once.

use crate::paths::FileJob;
use anyhow::Result;
use rayon::prelude::*;

/// Run `f` over `files` with at most `limit` in flight. The first error
/// stops scheduling further files and is returned.
pub fn for_each_file_limited<F>(files: &[FileJob], limit: usize, f: F) -> Result<()>
where
    F: Sync + Fn(&FileJob) -> Result<()>,
{
    if limit <= 1 || files.len() <= 1 {
        return files.iter().try_for_each(f);
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(limit.min(files.len()))
        .thread_name(|i| format!("tetl-map-{i}"))
        .build()?;
    pool.install(|| files.par_iter().try_for_each(|job| f(job)))
}
