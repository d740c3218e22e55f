use anyhow::Result;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use zstd::stream::read::Decoder;

use crate::paths::{FileJob, FileKind};
use crate::util::open_with_backoff;

/// How a file's stream ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinesRead {
    pub lines: u64,
    /// The file could not be opened or decoded to the end; lines after the
    /// failure point were not seen.
    pub truncated: bool,
}

#[inline]
fn warn_decode_skip(path: &Path, e: &io::Error) {
    let abs = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    tracing::warn!(
        path = %abs.display(),
        error = %e,
        "Skipping remainder of input after read/decode error"
    );
}

fn open_reader(job: &FileJob, read_buf_bytes: usize) -> io::Result<Box<dyn BufRead>> {
    let file = open_with_backoff(&job.path, 16, 50)?;
    let cap = read_buf_bytes.max(8 * 1024);
    Ok(match job.kind {
        FileKind::Plain => Box::new(BufReader::with_capacity(cap, file)),
        FileKind::Zstd => {
            // Large frames need the raised window limit.
            let mut decoder = Decoder::new(file)?;
            decoder.window_log_max(31)?;
            Box::new(BufReader::with_capacity(cap, decoder))
        }
    })
}

/// Stream `job` line-by-line (trailing `\n`/`\r\n` removed, blank lines
/// skipped). Invalid UTF-8 is replaced rather than aborting the file.
///
/// Open or decode failures are logged and end the file early (reported via
/// `LinesRead::truncated`); errors returned by `on_line` propagate.
pub fn for_each_line_cfg(
    job: &FileJob,
    read_buf_bytes: usize,
    mut on_line: impl FnMut(&str) -> Result<()>,
) -> Result<LinesRead> {
    let mut out = LinesRead::default();
    let mut reader = match open_reader(job, read_buf_bytes) {
        Ok(r) => r,
        Err(e) => {
            warn_decode_skip(&job.path, &e);
            out.truncated = true;
            return Ok(out);
        }
    };

    let mut buf: Vec<u8> = Vec::with_capacity(16 * 1024);
    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn_decode_skip(&job.path, &e);
                out.truncated = true;
                break;
            }
        };
        if n == 0 {
            break;
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") { buf.pop(); }
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        out.lines += 1;
        let line = String::from_utf8_lossy(&buf);
        on_line(&line)?;
    }
    Ok(out)
}
