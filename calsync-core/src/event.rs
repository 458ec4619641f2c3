//! Normalized event records.
//!
//! Every source converts whatever it scraped into an `EventRecord`. Records are
//! immutable once built: times are normalized to UTC at construction and the
//! only way to "change" a record is to build a new one.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use std::fmt;

use crate::error::{SyncError, SyncResult};

/// A single real-world event occurrence produced by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    description: Option<String>,
    location: Option<String>,
    url: Option<String>,
    is_confirmed: bool,
    source: Option<String>,
    source_id: Option<String>,
}

impl EventRecord {
    /// Build a record, normalizing both times to UTC with second precision.
    ///
    /// Fails if the event ends before it starts.
    pub fn new<Tz: TimeZone>(
        title: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> SyncResult<Self> {
        let title = normalize_text(title.into());
        let start = whole_seconds(start.with_timezone(&Utc));
        let end = whole_seconds(end.with_timezone(&Utc));

        if start > end {
            return Err(SyncError::Parse(format!(
                "Event '{}' ends before it starts ({} > {})",
                title,
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }

        Ok(EventRecord {
            title,
            start,
            end,
            description: None,
            location: None,
            url: None,
            is_confirmed: false,
            source: None,
            source_id: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<Option<String>>) -> Self {
        self.description = non_empty(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<Option<String>>) -> Self {
        self.location = non_empty(location.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<Option<String>>) -> Self {
        self.url = non_empty(url.into());
        self
    }

    pub fn with_confirmed(mut self, is_confirmed: bool) -> Self {
        self.is_confirmed = is_confirmed;
        self
    }

    /// Attach provenance. Never used for matching.
    pub fn with_source(
        mut self,
        source: impl Into<Option<String>>,
        source_id: impl Into<Option<String>>,
    ) -> Self {
        self.source = non_empty(source.into());
        self.source_id = non_empty(source_id.into());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_confirmed(&self) -> bool {
        self.is_confirmed
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Status written to the store: CONFIRMED or TENTATIVE.
    pub fn status(&self) -> EventStatus {
        if self.is_confirmed {
            EventStatus::Confirmed
        } else {
            EventStatus::Tentative
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.start.format("%Y-%m-%d %H:%M UTC"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Some(EventStatus::Confirmed),
            "TENTATIVE" => Some(EventStatus::Tentative),
            "CANCELLED" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

/// Start or end value of a stored entry.
///
/// Legacy entries may carry a pure date with no time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

impl EventTime {
    /// The instant this value denotes; dates are midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::DateTime(dt) => *dt,
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

impl Default for EventTime {
    fn default() -> Self {
        EventTime::DateTime(DateTime::<Utc>::default())
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

fn whole_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Unify line endings so text survives a write/read cycle through the store.
fn normalize_text(s: String) -> String {
    if s.contains('\r') {
        s.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        s
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(normalize_text).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_new_normalizes_to_utc() {
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let start = eastern.with_ymd_and_hms(2025, 3, 20, 18, 30, 0).unwrap();
        let end = eastern.with_ymd_and_hms(2025, 3, 20, 20, 30, 0).unwrap();

        let record = EventRecord::new("Talk", start, end).unwrap();

        assert_eq!(
            record.start(),
            Utc.with_ymd_and_hms(2025, 3, 20, 23, 30, 0).unwrap()
        );
        assert_eq!(
            record.end(),
            Utc.with_ymd_and_hms(2025, 3, 21, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_new_drops_sub_second_precision() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        let record = EventRecord::new("Talk", start, start).unwrap();
        assert_eq!(record.start().nanosecond(), 0);
    }

    #[test]
    fn test_new_rejects_end_before_start() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 20, 14, 0, 0).unwrap();

        let err = EventRecord::new("Backwards", start, end).unwrap_err();
        assert!(matches!(err, SyncError::Parse(_)), "Got {:?}", err);
    }

    #[test]
    fn test_empty_optional_fields_are_absent() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        let record = EventRecord::new("Talk", start, start)
            .unwrap()
            .with_description(String::new())
            .with_location("Office\r\nFloor 2".to_string());

        assert_eq!(record.description(), None);
        assert_eq!(record.location(), Some("Office\nFloor 2"));
        assert_eq!(record.url(), None);
    }

    #[test]
    fn test_status_follows_confirmation() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        let record = EventRecord::new("Talk", start, start).unwrap();
        assert_eq!(record.status(), EventStatus::Tentative);
        assert_eq!(record.with_confirmed(true).status(), EventStatus::Confirmed);
    }

    #[test]
    fn test_date_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        assert_eq!(
            EventTime::Date(date).to_utc(),
            Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap()
        );
    }
}
