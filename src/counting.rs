//! Per-job counters, shared across map workers.

use crate::filters::Rejection;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! job_counters {
    ($($name:ident),* $(,)?) => {
        #[derive(Debug, Default)]
        pub struct JobCounters {
            $(pub $name: AtomicU64,)*
        }

        /// Plain-value copy of [`JobCounters`].
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
        pub struct CounterSnapshot {
            $(pub $name: u64,)*
        }

        impl JobCounters {
            pub fn snapshot(&self) -> CounterSnapshot {
                CounterSnapshot { $($name: self.$name.load(Ordering::Relaxed),)* }
            }
        }
    };
}

job_counters! {
    files_read,
    files_date_invalid,
    files_truncated,
    records_read,
    records_malformed,
    records_date_invalid,
    records_out_of_window,
    records_spam,
    records_foreign_url,
    records_no_author,
    records_mapped,
    extract_failed,
    vectors_emitted,
    combine_spills,
    provisional,
}

impl JobCounters {
    #[inline]
    pub fn inc(c: &AtomicU64) {
        c.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(c: &AtomicU64, n: u64) {
        c.fetch_add(n, Ordering::Relaxed);
    }

    pub fn reject(&self, why: Rejection) {
        let c = match why {
            Rejection::BadDate => &self.records_date_invalid,
            Rejection::OutOfWindow => &self.records_out_of_window,
            Rejection::Spam => &self.records_spam,
            Rejection::ForeignUrl => &self.records_foreign_url,
            Rejection::NoAuthor => &self.records_no_author,
        };
        Self::inc(c);
    }
}

impl CounterSnapshot {
    /// Records turned away by the record filter.
    pub fn records_rejected(&self) -> u64 {
        self.records_date_invalid
            + self.records_out_of_window
            + self.records_spam
            + self.records_foreign_url
            + self.records_no_author
    }
}
