//! Gazetteer tries: an immutable token-level prefix tree built once from
//! gazetteer files, persisted as zstd-compressed JSON, and shared read-only by
//! every record a worker processes.
//!
//! Nodes live in a flat arena (`Vec<TrieNode>`); a node's children map tokens to
//! arena indices. Children are always allocated after their parent, so a child
//! index is strictly greater than its parent's. That ordering is what the loader
//! checks to reject cyclic or dangling persisted tries.

use crate::error::GazetteerError;
use crate::tokens::normalize_token;
use crate::util::{create_with_backoff, init_tracing_once, open_with_backoff, replace_file_atomic_backoff};
use ahash::RandomState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const PERSIST_FORMAT: &str = "tetl-gazetteer";
const PERSIST_VERSION: u32 = 1;

/// One gazetteer entry: an ordered sequence of normalized tokens.
pub type Phrase = Vec<String>;

/// Index of a node inside a trie's arena. `NodeId::ROOT` is the empty prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

type Children = HashMap<String, NodeId, RandomState>;

fn no_children(c: &Children) -> bool {
    c.is_empty()
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TrieNode {
    #[serde(rename = "t", default, skip_serializing_if = "is_false")]
    terminal: bool,
    #[serde(rename = "c", default, skip_serializing_if = "no_children")]
    children: Children,
}

/// Immutable token trie. There are no mutating methods: build one with
/// [`GazetteerBuilder`] or load a persisted one, then share it by reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GazetteerTrie {
    nodes: Vec<TrieNode>,
    phrases: usize,
}

impl Default for GazetteerTrie {
    fn default() -> Self {
        Self { nodes: vec![TrieNode::default()], phrases: 0 }
    }
}

/// Counters from loading gazetteer source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GazetteerLoadReport {
    /// Non-empty lines seen.
    pub lines: u64,
    /// Distinct phrases inserted (duplicates are not counted).
    pub phrases: u64,
    /// Malformed lines skipped.
    pub skipped: u64,
}

impl GazetteerTrie {
    /// Build from already-tokenized phrases. Tokens are normalized, duplicates collapse.
    pub fn from_phrases<I, P, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut b = GazetteerBuilder::new();
        for p in phrases {
            b.insert(p);
        }
        b.build()
    }

    /// Build from a gazetteer source file, logging the load report.
    pub fn from_gazetteer_file(path: &Path) -> Result<Self> {
        init_tracing_once();
        let builder = GazetteerBuilder::from_file(path)?;
        let r = builder.report();
        tracing::info!(
            path = %path.display(), lines = r.lines, phrases = r.phrases, skipped = r.skipped,
            "gazetteer loaded"
        );
        Ok(builder.build())
    }

    /// Number of distinct phrases.
    pub fn len(&self) -> usize {
        self.phrases
    }

    pub fn is_empty(&self) -> bool {
        self.phrases == 0
    }

    /// Number of nodes including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Follow one token from `node`. Absence is a normal outcome, not an error.
    #[inline]
    pub fn child(&self, node: NodeId, token: &str) -> Option<NodeId> {
        self.nodes.get(node.index())?.children.get(token).copied()
    }

    #[inline]
    pub fn is_terminal(&self, node: NodeId) -> bool {
        self.nodes.get(node.index()).map_or(false, |n| n.terminal)
    }

    fn walk<S: AsRef<str>>(&self, tokens: &[S]) -> Option<NodeId> {
        tokens
            .iter()
            .try_fold(NodeId::ROOT, |node, t| self.child(node, t.as_ref()))
    }

    /// True iff `tokens` is exactly an inserted phrase: not a strict prefix of one,
    /// not a longer sequence that merely starts with one.
    pub fn contains_exact<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        if tokens.is_empty() {
            return false;
        }
        self.walk(tokens).map_or(false, |n| self.is_terminal(n))
    }

    /// True iff some stored phrase starts with `tokens` (or equals it).
    /// This is the loose membership test; job decisions use [`contains_exact`].
    ///
    /// [`contains_exact`]: GazetteerTrie::contains_exact
    pub fn has_phrase_with_prefix<S: AsRef<str>>(&self, tokens: &[S]) -> bool {
        if tokens.is_empty() {
            return !self.is_empty();
        }
        // Every non-root node lies on the path of at least one phrase.
        self.walk(tokens).is_some()
    }

    /// All phrases, sorted. Intended for inspection and tests.
    pub fn phrases(&self) -> Vec<Phrase> {
        let mut out = Vec::with_capacity(self.phrases);
        let mut stack: Vec<(NodeId, Phrase)> = vec![(NodeId::ROOT, Vec::new())];
        while let Some((id, prefix)) = stack.pop() {
            let node = &self.nodes[id.index()];
            if node.terminal {
                out.push(prefix.clone());
            }
            for (tok, child) in &node.children {
                let mut p = prefix.clone();
                p.push(tok.clone());
                stack.push((*child, p));
            }
        }
        out.sort();
        out
    }

    // -------- Persistence --------

    /// Write the trie to `path` (zstd-compressed JSON), via a temp file that is
    /// promoted atomically once complete.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = inprogress_path(path);
        let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
        let mut enc = zstd::stream::write::Encoder::new(BufWriter::new(f), 3)?;
        let doc = PersistedRef {
            format: PERSIST_FORMAT,
            version: PERSIST_VERSION,
            phrases: self.phrases,
            nodes: &self.nodes,
        };
        serde_json::to_writer(&mut enc, &doc).with_context(|| format!("serialize {}", tmp.display()))?;
        let mut w = enc.finish()?;
        w.flush()?;
        drop(w);
        replace_file_atomic_backoff(&tmp, path)?;
        tracing::debug!(path = %path.display(), nodes = self.nodes.len(), phrases = self.phrases, "gazetteer persisted");
        Ok(())
    }

    /// Load a persisted trie. Any failure is fatal for the caller.
    pub fn load(path: &Path) -> std::result::Result<Self, GazetteerError> {
        let f = open_with_backoff(path, 16, 50)
            .map_err(|source| GazetteerError::Io { path: path.to_path_buf(), source })?;
        let dec = zstd::stream::read::Decoder::new(f)
            .map_err(|source| GazetteerError::Io { path: path.to_path_buf(), source })?;
        let doc: PersistedOwned = serde_json::from_reader(dec).map_err(|e| GazetteerError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.format != PERSIST_FORMAT || doc.version != PERSIST_VERSION {
            return Err(GazetteerError::UnsupportedVersion {
                path: path.to_path_buf(),
                format: doc.format,
                version: doc.version,
            });
        }
        validate_arena(&doc.nodes, doc.phrases).map_err(|reason| GazetteerError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Self { nodes: doc.nodes, phrases: doc.phrases })
    }

    /// Load `persisted` if it exists; otherwise build from `source` and persist it.
    pub fn load_or_build(source: &Path, persisted: &Path) -> Result<Self> {
        init_tracing_once();
        if persisted.exists() {
            let trie = Self::load(persisted)?;
            tracing::info!(path = %persisted.display(), phrases = trie.len(), "gazetteer trie loaded");
            return Ok(trie);
        }
        let trie = Self::from_gazetteer_file(source)?;
        trie.save(persisted)?;
        Ok(trie)
    }
}

fn inprogress_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "trie".into());
    path.with_file_name(format!("{name}.inprogress"))
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    format: &'a str,
    version: u32,
    phrases: usize,
    nodes: &'a [TrieNode],
}

#[derive(Deserialize)]
struct PersistedOwned {
    format: String,
    version: u32,
    phrases: usize,
    nodes: Vec<TrieNode>,
}

fn validate_arena(nodes: &[TrieNode], phrases: usize) -> std::result::Result<(), String> {
    if nodes.is_empty() {
        return Err("no root node".into());
    }
    if nodes[0].terminal {
        return Err("root marked terminal".into());
    }
    if nodes.len() > u32::MAX as usize {
        return Err(format!("too many nodes: {}", nodes.len()));
    }
    let mut has_parent = vec![false; nodes.len()];
    has_parent[0] = true;
    for (i, n) in nodes.iter().enumerate() {
        for (tok, child) in &n.children {
            let c = child.index();
            if tok.is_empty() {
                return Err(format!("empty token under node {i}"));
            }
            if c <= i || c >= nodes.len() {
                return Err(format!("node {i} has out-of-order child {c}"));
            }
            if std::mem::replace(&mut has_parent[c], true) {
                return Err(format!("node {c} has more than one parent"));
            }
        }
    }
    if let Some(orphan) = has_parent.iter().position(|p| !p) {
        return Err(format!("node {orphan} is unreachable"));
    }
    let terminals = nodes.iter().filter(|n| n.terminal).count();
    if terminals != phrases {
        return Err(format!("header says {phrases} phrases, found {terminals} terminal nodes"));
    }
    // Leaves must end a phrase, otherwise prefix queries would report ghosts.
    if let Some(i) = nodes.iter().skip(1).position(|n| n.children.is_empty() && !n.terminal) {
        return Err(format!("leaf node {} is not terminal", i + 1));
    }
    Ok(())
}

/// Mutable construction side of a [`GazetteerTrie`].
#[derive(Debug, Default)]
pub struct GazetteerBuilder {
    trie: GazetteerTrie,
    report: GazetteerLoadReport,
}

impl GazetteerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one phrase. Tokens are normalized and empty tokens dropped.
    /// Returns true if the phrase was not already present.
    pub fn insert<P, S>(&mut self, phrase: P) -> bool
    where
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut node = NodeId::ROOT;
        let mut depth = 0usize;
        for raw in phrase {
            let tok = normalize_token(raw.as_ref());
            if tok.is_empty() {
                continue;
            }
            node = match self.trie.child(node, &tok) {
                Some(next) => next,
                None => {
                    let next = NodeId(self.trie.nodes.len() as u32);
                    self.trie.nodes.push(TrieNode::default());
                    self.trie.nodes[node.index()].children.insert(tok, next);
                    next
                }
            };
            depth += 1;
        }
        if depth == 0 {
            return false;
        }
        let n = &mut self.trie.nodes[node.index()];
        if n.terminal {
            return false;
        }
        n.terminal = true;
        self.trie.phrases += 1;
        self.report.phrases += 1;
        true
    }

    /// Insert every comma-separated synonym on one gazetteer line.
    /// Returns false when the line carries no usable phrase.
    pub fn insert_line(&mut self, line: &str) -> bool {
        let mut usable = false;
        for alt in line.trim().split(',') {
            let toks: Vec<String> = alt
                .split_whitespace()
                .map(normalize_token)
                .filter(|t| !t.is_empty())
                .collect();
            if toks.is_empty() {
                continue;
            }
            usable = true;
            self.insert(toks);
        }
        usable
    }

    /// Load newline-delimited gazetteer text. Malformed lines are skipped and counted.
    pub fn load_reader<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::with_capacity(256);
        let mut line_no = 0u64;
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_no += 1;
            let line = match std::str::from_utf8(&buf) {
                Ok(s) => s,
                Err(e) => {
                    self.report.lines += 1;
                    self.report.skipped += 1;
                    tracing::warn!(line = line_no, error = %e, "skipping gazetteer line: not UTF-8");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            self.report.lines += 1;
            if !self.insert_line(line) {
                self.report.skipped += 1;
                tracing::warn!(line = line_no, "skipping gazetteer line: no usable phrase");
            }
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let f = open_with_backoff(path, 16, 50).with_context(|| format!("open gazetteer {}", path.display()))?;
        let mut b = Self::new();
        b.load_reader(BufReader::new(f))
            .with_context(|| format!("read gazetteer {}", path.display()))?;
        Ok(b)
    }

    pub fn report(&self) -> &GazetteerLoadReport {
        &self.report
    }

    pub fn build(self) -> GazetteerTrie {
        self.trie
    }
}
