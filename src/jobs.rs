//! Feature-extraction jobs. Each job maps an accepted record to zero or more
//! keyed vectors of a fixed width, and decides per key, once, whether the
//! fully reduced total is emitted.

use crate::accumulate::FeatureVector;
use crate::edge::{edge_observation, EDGE_SEPARATOR};
use crate::gate::ThresholdGate;
use crate::gazetteer::GazetteerTrie;
use crate::matcher::any_subsequence_matches;
use crate::record::RecordView;
use crate::tokens::{mentions_counted, normalize_token};
use crate::util::merge_extra_users;
use ahash::AHashSet;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// One keyed contribution from the map step.
pub type Emission = (String, FeatureVector<i64>);

pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Schema length of every vector this job emits.
    fn width(&self) -> usize;

    /// Features of one record. An `Err` marks the record as failed
    /// extraction; it is counted and skipped.
    fn map(&self, rec: &RecordView<'_>) -> Result<Vec<Emission>>;

    /// Gate tested on running partials during combine (provisional signal)
    /// and on the final total.
    fn gate(&self) -> Option<&ThresholdGate<i64>> {
        None
    }

    /// Output payload (`v1,...,vN`) for a fully reduced key, or `None` to drop it.
    fn finalize(&self, key: &str, total: FeatureVector<i64>) -> Option<String>;
}

// ----------------------------- user statistics -----------------------------

pub mod user_stats {
    pub const COUNT: usize = 0;
    pub const IN_TIME: usize = 1;
    pub const WEST_AFRICA: usize = 2;
    pub const OTHER_PLACE: usize = 3;
    pub const CRISISLEX: usize = 4;
    pub const EBOLA: usize = 5;
    pub const TIME_OF_DAY: usize = 6;
    pub const NAME_MATCH: usize = 7;
    pub const WIDTH: usize = 8;
}

/// Per-author activity profile against place and crisis gazetteers.
pub struct UserStatsJob {
    west_africa: GazetteerTrie,
    other_places: GazetteerTrie,
    crisislex: GazetteerTrie,
    /// Seconds after midnight UTC from which a post counts as in-time.
    pub day_start_secs: i64,
    /// Emit when `name_match / count` is strictly above this...
    pub min_name_share: f64,
    /// ...or when `count` and the west-africa hits are strictly above these.
    pub min_count: i64,
    pub min_west_africa: i64,
}

impl UserStatsJob {
    pub fn new(west_africa: GazetteerTrie, other_places: GazetteerTrie, crisislex: GazetteerTrie) -> Self {
        Self {
            west_africa,
            other_places,
            crisislex,
            day_start_secs: 7 * 3600,
            min_name_share: 0.5,
            min_count: 9,
            min_west_africa: 3,
        }
    }

    pub fn with_thresholds(mut self, min_name_share: f64, min_count: i64, min_west_africa: i64) -> Self {
        self.min_name_share = min_name_share;
        self.min_count = min_count;
        self.min_west_africa = min_west_africa;
        self
    }
}

/// Display name mentions one of the affected countries.
pub fn name_matches_region(display_name: &str) -> bool {
    let lowered = display_name.to_lowercase();
    if lowered.contains("sierra leone") {
        return true;
    }
    lowered
        .replace([',', '.'], " ")
        .split_whitespace()
        .any(|t| t == "liberia" || t == "guinea")
}

impl Job for UserStatsJob {
    fn name(&self) -> &str {
        "users"
    }

    fn width(&self) -> usize {
        user_stats::WIDTH
    }

    fn map(&self, rec: &RecordView<'_>) -> Result<Vec<Emission>> {
        use user_stats::*;
        let secs = rec.seconds_of_day();
        let mut v = vec![0i64; WIDTH];
        v[COUNT] = 1;
        v[IN_TIME] = (secs >= self.day_start_secs) as i64;
        v[WEST_AFRICA] = any_subsequence_matches(&rec.tokens, &self.west_africa) as i64;
        v[OTHER_PLACE] = any_subsequence_matches(&rec.tokens, &self.other_places) as i64;
        v[CRISISLEX] = any_subsequence_matches(&rec.tokens, &self.crisislex) as i64;
        v[EBOLA] = rec.has_token("ebola") as i64;
        v[TIME_OF_DAY] = secs;
        v[NAME_MATCH] = rec.record.author_name.as_deref().map_or(false, name_matches_region) as i64;
        Ok(vec![(rec.author.clone(), FeatureVector::new(v))])
    }

    /// Total seconds become the mean time of day, written as a float
    /// (`28800.0`, `10800.5`); every other column stays an integer count.
    fn finalize(&self, _key: &str, total: FeatureVector<i64>) -> Option<String> {
        use user_stats::*;
        let v = total.into_inner();
        let count = *v.get(COUNT)?;
        if count <= 0 {
            return None;
        }
        let name_share = v[NAME_MATCH] as f64 / count as f64;
        let active = count > self.min_count && v[WEST_AFRICA] > self.min_west_africa;
        if !(name_share > self.min_name_share || active) {
            return None;
        }
        let mean_time = v[TIME_OF_DAY] as f64 / count as f64;
        let cols: Vec<String> = v
            .iter()
            .enumerate()
            .map(|(i, n)| if i == TIME_OF_DAY { format!("{mean_time:?}") } else { n.to_string() })
            .collect();
        Some(cols.join(","))
    }
}

// ----------------------------- tweet summaries -----------------------------

/// Column layout of [`TweetSummaryJob`] vectors. Each post lands in exactly one
/// column, picked by which of the west-africa, ebola and crisislex signals it
/// carries.
pub mod tweet_summary {
    pub const WAF: usize = 0;
    pub const EBOLA: usize = 1;
    pub const WAF_EBOLA: usize = 2;
    pub const WAF_LEX: usize = 3;
    pub const EBOLA_LEX: usize = 4;
    pub const ALL: usize = 5;
    pub const NONE: usize = 6;
    pub const LEX: usize = 7;
    pub const WIDTH: usize = 8;

    /// Column for a post with the given signals.
    pub fn category(waf: bool, ebola: bool, lex: bool) -> usize {
        match (waf, ebola, lex) {
            (true, true, true) => ALL,
            (true, true, false) => WAF_EBOLA,
            (true, false, true) => WAF_LEX,
            (false, true, true) => EBOLA_LEX,
            (true, false, false) => WAF,
            (false, true, false) => EBOLA,
            (false, false, true) => LEX,
            (false, false, false) => NONE,
        }
    }
}

/// Per-author counts of posts by signal combination.
pub struct TweetSummaryJob {
    west_africa: GazetteerTrie,
    crisislex: GazetteerTrie,
}

impl TweetSummaryJob {
    pub fn new(west_africa: GazetteerTrie, crisislex: GazetteerTrie) -> Self {
        Self { west_africa, crisislex }
    }
}

impl Job for TweetSummaryJob {
    fn name(&self) -> &str {
        "summaries"
    }

    fn width(&self) -> usize {
        tweet_summary::WIDTH
    }

    fn map(&self, rec: &RecordView<'_>) -> Result<Vec<Emission>> {
        let waf = any_subsequence_matches(&rec.tokens, &self.west_africa);
        let ebola = rec.has_token("ebola");
        let lex = any_subsequence_matches(&rec.tokens, &self.crisislex);
        let mut v = vec![0i64; tweet_summary::WIDTH];
        v[tweet_summary::category(waf, ebola, lex)] = 1;
        Ok(vec![(rec.author.clone(), FeatureVector::new(v))])
    }

    fn finalize(&self, _key: &str, total: FeatureVector<i64>) -> Option<String> {
        Some(total.to_csv())
    }
}

// ----------------------------- keyword users -------------------------------

/// Per-author post count plus a presence count per keyword.
pub struct KeywordUsersJob {
    keywords: Vec<String>,
}

impl KeywordUsersJob {
    /// Keywords are normalized like tokens; blanks and repeats are dropped.
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = AHashSet::new();
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| normalize_token(k.as_ref().trim()))
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .collect();
        if keywords.is_empty() {
            bail!("keyword job needs at least one non-empty keyword");
        }
        Ok(Self { keywords })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Job for KeywordUsersJob {
    fn name(&self) -> &str {
        "keywords"
    }

    fn width(&self) -> usize {
        1 + self.keywords.len()
    }

    fn map(&self, rec: &RecordView<'_>) -> Result<Vec<Emission>> {
        let present: AHashSet<&str> = rec.tokens.iter().map(String::as_str).collect();
        let mut v = Vec::with_capacity(self.width());
        v.push(1);
        v.extend(self.keywords.iter().map(|k| present.contains(k.as_str()) as i64));
        Ok(vec![(rec.author.clone(), FeatureVector::new(v))])
    }

    /// Authors who never used any keyword are dropped here, after the totals
    /// are complete.
    fn finalize(&self, _key: &str, total: FeatureVector<i64>) -> Option<String> {
        if total.as_slice().iter().skip(1).any(|&n| n > 0) {
            Some(total.to_csv())
        } else {
            None
        }
    }
}

// ----------------------------- mention edges -------------------------------

/// Directed mention counts between pairs of users, at least one of whom is
/// in the watched user set. Pairs are kept when both directions pass the gate.
pub struct MentionEdgeJob {
    users: AHashSet<String>,
    gate: ThresholdGate<i64>,
    unusable_handles: AtomicU64,
}

impl MentionEdgeJob {
    /// Handles are lowercased with any leading `@` removed. Handles that would
    /// contain the edge key separator are dropped.
    pub fn new<I, S>(users: I, min_each_direction: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut users: AHashSet<String> = users.into_iter().map(|u| normalize_handle(u.as_ref())).collect();
        retain_usable(&mut users);
        Self { users, gate: ThresholdGate::bidirectional(min_each_direction), unusable_handles: AtomicU64::new(0) }
    }

    /// Add handles from the file named by `TETL_EXTRA_USERS_FILE`, if set.
    pub fn with_env_users(mut self) -> Self {
        merge_extra_users(&mut self.users);
        retain_usable(&mut self.users);
        self
    }

    /// Mentions (or authors) skipped because the handle contains `@`, so no
    /// unambiguous edge key exists for them.
    pub fn unusable_handles(&self) -> u64 {
        self.unusable_handles.load(Ordering::Relaxed)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_watched(&self, handle: &str) -> bool {
        self.users.contains(handle)
    }
}

fn retain_usable(users: &mut AHashSet<String>) {
    users.retain(|u| !u.is_empty() && !u.contains(EDGE_SEPARATOR));
}

pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

impl Job for MentionEdgeJob {
    fn name(&self) -> &str {
        "edges"
    }

    fn width(&self) -> usize {
        2
    }

    fn map(&self, rec: &RecordView<'_>) -> Result<Vec<Emission>> {
        let author_watched = self.is_watched(&rec.author);
        let (handles, mut unusable) = mentions_counted(&rec.raw_tokens);
        let mut out = Vec::with_capacity(handles.len());
        for m in handles.iter().filter(|m| author_watched || self.is_watched(m)) {
            match edge_observation(&rec.author, m) {
                Some(edge) => out.push(edge),
                None if rec.author != *m => unusable += 1,
                None => {}
            }
        }
        if unusable > 0 {
            self.unusable_handles.fetch_add(unusable as u64, Ordering::Relaxed);
            tracing::debug!(author = %rec.author, unusable, "mentions with `@` inside the handle skipped");
        }
        Ok(out)
    }

    fn gate(&self) -> Option<&ThresholdGate<i64>> {
        Some(&self.gate)
    }

    fn finalize(&self, _key: &str, total: FeatureVector<i64>) -> Option<String> {
        if self.gate.passes(&total) {
            Some(total.to_csv())
        } else {
            None
        }
    }
}
