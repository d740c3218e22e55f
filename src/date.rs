use time::macros::datetime;
use time::{Date, OffsetDateTime};

/// Half-open publication window `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Default for DateWindow {
    /// February through November 2014.
    fn default() -> Self {
        Self {
            start: datetime!(2014-02-01 0:00 UTC),
            end: datetime!(2014-12-01 0:00 UTC),
        }
    }
}

impl DateWindow {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    /// Record-level test.
    #[inline]
    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// File-level test on a bucket date. Both ends inclusive: a bucket dated on
    /// the end day may still hold records from before the cut-off.
    #[inline]
    pub fn contains_date(&self, d: Date) -> bool {
        self.start.date() <= d && d <= self.end.date()
    }
}
