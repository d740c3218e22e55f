#![allow(dead_code)]

use serde_json::json;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Write a plain text file, one entry per line.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l.as_ref()).unwrap();
    }
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Parse `key,v1,...,vN` output into a map.
pub fn read_output(path: &Path) -> BTreeMap<String, Vec<i64>> {
    read_lines(path)
        .into_iter()
        .map(|l| {
            let mut parts = l.split(',');
            let key = parts.next().unwrap().to_string();
            let vals = parts.map(|v| v.parse::<i64>().unwrap()).collect();
            (key, vals)
        })
        .collect()
}

/// A well-formed, in-window, on-platform record with pre-tokenized body.
pub fn tweet(author: &str, published: &str, tokens: &[&str]) -> String {
    json!({
        "author": author,
        "author_name": format!("{author} (Example)"),
        "published": published,
        "body": tokens.join(" "),
        "lang": "en",
        "spam_probability": 0.01,
        "url": format!("http://twitter.com/{author}/status/1"),
        "tokens": tokens,
    })
    .to_string()
}

/// Same as [`tweet`] with a display name.
pub fn tweet_named(author: &str, name: &str, published: &str, tokens: &[&str]) -> String {
    json!({
        "author": author,
        "author_name": name,
        "published": published,
        "spam_probability": 0.0,
        "url": format!("https://twitter.com/{author}/status/2"),
        "tokens": tokens,
    })
    .to_string()
}

/// `author` mentions each of `targets` once, in one record.
pub fn mention(author: &str, targets: &[&str]) -> String {
    let toks: Vec<String> = targets.iter().map(|t| format!("@{t}")).collect();
    let refs: Vec<&str> = toks.iter().map(String::as_str).collect();
    tweet(author, "2014-06-01T12:00:00Z", &refs)
}

/// Tiny mention corpus split over two crawl-day directories and both encodings:
///
/// - `2014-06-01/a.jsonl`: alice→bob, bob→alice, carol→alice
/// - `2014-06-02/b.zst`:   alice→bob, bob→alice, bob→bob (self), dave→erin
///
/// Final edge totals: `alice@bob = 2,2`, `alice@carol = 0,1`, `dave@erin = 1,0`.
pub fn make_mention_corpus(base: &Path) {
    write_lines(
        &base.join("2014-06-01").join("a.jsonl"),
        &[mention("alice", &["bob"]), mention("bob", &["alice"]), mention("carol", &["alice"])],
    );
    write_zst_lines(
        &base.join("2014-06-02").join("b.zst"),
        &[mention("alice", &["bob"]), mention("bob", &["alice", "bob"]), mention("dave", &["erin"])],
    );
}

pub fn write_gazetteer(path: &Path, lines: &[&str]) {
    write_lines(path, lines);
}
