//! Decrypted record schema and the per-record view handed to jobs.

use crate::tokens::{normalize_tokens, Tokenizer};
use anyhow::Result;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One decrypted post, one NDJSON line. Unknown fields are ignored by serde.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TweetRecord {
    /// Screen handle of the author.
    pub author: Option<String>,
    /// Display name, e.g. "Jane Doe".
    pub author_name: Option<String>,
    /// RFC 3339 publication time.
    pub published: Option<String>,
    pub body: Option<String>,
    pub lang: Option<String>,
    pub spam_probability: Option<f64>,
    /// Canonical link of the post.
    pub url: Option<String>,
    /// Pre-tokenized body; preferred over re-tokenizing `body`.
    pub tokens: Option<Vec<String>>,
}

#[inline]
pub fn parse_record(line: &str) -> Result<TweetRecord> {
    Ok(serde_json::from_str(line)?)
}

impl TweetRecord {
    pub fn published_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(self.published.as_deref()?.trim(), &Rfc3339).ok()
    }

    /// Lowercased, trimmed author handle with any leading `@` removed.
    pub fn handle(&self) -> Option<String> {
        let h = self.author.as_deref()?.trim().trim_start_matches('@').to_lowercase();
        if h.is_empty() { None } else { Some(h) }
    }

    /// Raw tokens: the record's own when present, otherwise `tokenizer` over `body`.
    pub fn raw_tokens(&self, tokenizer: &dyn Tokenizer) -> Vec<String> {
        match &self.tokens {
            Some(t) => t.clone(),
            None => self.body.as_deref().map(|b| tokenizer.tokenize(b)).unwrap_or_default(),
        }
    }
}

/// Everything a job needs about one accepted record.
#[derive(Debug)]
pub struct RecordView<'a> {
    pub record: &'a TweetRecord,
    pub author: String,
    pub published: OffsetDateTime,
    /// Tokens as produced upstream (keeps `@`/`#` marks).
    pub raw_tokens: Vec<String>,
    /// Lowercased, hashtag marks stripped.
    pub tokens: Vec<String>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a TweetRecord, author: String, published: OffsetDateTime, tokenizer: &dyn Tokenizer) -> Self {
        let raw_tokens = record.raw_tokens(tokenizer);
        let tokens = normalize_tokens(&raw_tokens);
        Self { record, author, published, raw_tokens, tokens }
    }

    /// Seconds since midnight UTC.
    pub fn seconds_of_day(&self) -> i64 {
        let t = self.published.to_offset(time::UtcOffset::UTC).time();
        t.hour() as i64 * 3600 + t.minute() as i64 * 60 + t.second() as i64
    }

    pub fn has_token(&self, tok: &str) -> bool {
        self.tokens.iter().any(|t| t == tok)
    }
}
