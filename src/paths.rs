use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use time::{Date, Month};
use walkdir::WalkDir;

/// Encoding of an input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Plain, // *.jsonl, *.ndjson, *.json
    Zstd,  // *.zst
}

#[derive(Clone, Debug)]
pub struct FileJob {
    pub kind: FileKind,
    pub path: PathBuf,
    /// Crawl date taken from the parent directory name (`YYYY-MM-DD...`).
    pub bucket_date: Option<Date>,
}

fn kind_of(path: &Path) -> Option<FileKind> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "zst" => Some(FileKind::Zstd),
        "jsonl" | "ndjson" | "json" => Some(FileKind::Plain),
        _ => None,
    }
}

fn bucket_date(path: &Path, re: &Regex) -> Option<Date> {
    let name = path.parent()?.file_name()?.to_str()?;
    let caps = re.captures(name)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u8 = caps[2].parse().ok()?;
    let day: u8 = caps[3].parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

/// All record files below `dir`, sorted by path. Hidden entries are skipped.
pub fn discover_inputs(dir: &Path) -> Result<Vec<FileJob>> {
    let re = Regex::new(r"^(\d{4})-(\d{2})-(\d{2})")?;
    let mut jobs = Vec::new();
    if !dir.exists() {
        return Ok(jobs);
    }
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !e.file_name().to_str().map_or(false, |n| n.starts_with('.')));
    for entry in walker {
        let ent = entry.with_context(|| format!("walking {}", dir.display()))?;
        if !ent.file_type().is_file() {
            continue;
        }
        let path = ent.path();
        if let Some(kind) = kind_of(path) {
            jobs.push(FileJob { kind, path: path.to_path_buf(), bucket_date: bucket_date(path, &re) });
        }
    }
    jobs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(jobs)
}
