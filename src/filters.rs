//! Record-level admission: publication window, spam ceiling, and the
//! platform-link check. Applied before any job sees a record.

use crate::date::DateWindow;
use crate::record::TweetRecord;
use time::OffsetDateTime;

/// Why a record was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// Missing or unparseable `published`.
    BadDate,
    OutOfWindow,
    Spam,
    /// Link does not point at the platform.
    ForeignUrl,
    /// Missing author handle.
    NoAuthor,
}

#[derive(Clone, Debug)]
pub struct RecordFilter {
    pub window: DateWindow,
    /// Records with `spam_probability` strictly above this are dropped.
    pub max_spam_probability: f64,
    /// When set, a record's `url` must point at twitter.com.
    pub twitter_only: bool,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            window: DateWindow::default(),
            max_spam_probability: 0.5,
            twitter_only: true,
        }
    }
}

impl RecordFilter {
    /// Accept everything that has an author and a parseable date.
    pub fn permissive() -> Self {
        Self {
            window: DateWindow::new(OffsetDateTime::UNIX_EPOCH, time::macros::datetime!(9999-12-31 0:00 UTC)),
            max_spam_probability: 1.0,
            twitter_only: false,
        }
    }

    pub fn with_window(mut self, window: DateWindow) -> Self { self.window = window; self }
    pub fn with_max_spam_probability(mut self, p: f64) -> Self { self.max_spam_probability = p; self }
    pub fn with_twitter_only(mut self, yes: bool) -> Self { self.twitter_only = yes; self }

    /// Accepted records yield their normalized handle and publication time.
    pub fn admit(&self, rec: &TweetRecord) -> Result<(String, OffsetDateTime), Rejection> {
        let published = rec.published_at().ok_or(Rejection::BadDate)?;
        if !self.window.contains(published) {
            return Err(Rejection::OutOfWindow);
        }
        if rec.spam_probability.map_or(false, |p| p > self.max_spam_probability) {
            return Err(Rejection::Spam);
        }
        if self.twitter_only {
            // a missing url is treated as on-platform
            if let Some(url) = rec.url.as_deref() {
                if !is_twitter_url(url) {
                    return Err(Rejection::ForeignUrl);
                }
            }
        }
        let author = rec.handle().ok_or(Rejection::NoAuthor)?;
        Ok((author, published))
    }
}

pub fn is_twitter_url(url: &str) -> bool {
    TWITTER_PREFIXES
        .iter()
        .any(|p| url.get(..p.len()).map_or(false, |head| head.eq_ignore_ascii_case(p)))
}

const TWITTER_PREFIXES: [&str; 2] = ["http://twitter.com/", "https://twitter.com/"];
