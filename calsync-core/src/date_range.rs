//! Time windows for calendar searches.

use chrono::{DateTime, Duration, Utc};

/// A closed range of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    /// `center ± radius`
    pub fn around(center: DateTime<Utc>, radius: Duration) -> Self {
        DateRange {
            from: center - radius,
            to: center + radius,
        }
    }

    /// From now until `days` days ahead.
    pub fn upcoming(days: u32) -> Self {
        let now = Utc::now();
        DateRange {
            from: now,
            to: now + Duration::days(i64::from(days)),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }

    /// Whether an event spanning `start..=end` intersects this range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.to && end >= self.from
    }

    /// `from` in CalDAV time-range format (`YYYYMMDDTHHMMSSZ`).
    pub fn from_caldav(&self) -> String {
        format_caldav_datetime(self.from)
    }

    /// `to` in CalDAV time-range format (`YYYYMMDDTHHMMSSZ`).
    pub fn to_caldav(&self) -> String {
        format_caldav_datetime(self.to)
    }
}

pub fn format_caldav_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
