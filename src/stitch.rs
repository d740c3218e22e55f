//! Output stitching: concatenate reduced shard outputs into the final file.

use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic_backoff};
use anyhow::{Context, Result};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<path><suffix>` next to `path`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Concatenate `parts` in the given order into `out_path`, via a temp file
/// that is promoted only once complete.
pub fn concat_parts(parts: &[PathBuf], out_path: &Path, write_buf: usize) -> Result<()> {
    if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let tmp = sibling_with_suffix(out_path, ".inprogress");
    {
        let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut out = BufWriter::with_capacity(write_buf, f);
        for p in parts {
            let f = open_with_backoff(p, 16, 50).with_context(|| format!("open {}", p.display()))?;
            io::copy(&mut BufReader::new(f), &mut out)?;
        }
        out.flush()?;
    }
    replace_file_atomic_backoff(&tmp, out_path)
}
