//! Calendar object generation.

use chrono::Utc;
use icalendar::{Calendar, Component, EventLike};

use crate::event::EventRecord;

const PRODID: &str = "-//calsync//calsync//EN";

/// Provenance properties. Carried for debugging only, never matched on.
pub(crate) const X_EVENT_SOURCE: &str = "X-EVENT-SOURCE";
pub(crate) const X_SOURCE_ID: &str = "X-SOURCE-ID";

/// Render a record as a VCALENDAR containing one VEVENT.
///
/// Times are written in UTC with second precision. Optional fields are only
/// emitted when present.
pub fn generate_ics(record: &EventRecord, uid: &str) -> String {
    let mut cal = Calendar::empty();
    cal.append_property(("VERSION", "2.0"));
    cal.append_property(("PRODID", PRODID));

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(uid);
    ics_event.timestamp(Utc::now());
    ics_event.summary(record.title());
    ics_event.starts(record.start());
    ics_event.ends(record.end());

    if let Some(description) = record.description() {
        ics_event.description(description);
    }
    if let Some(location) = record.location() {
        ics_event.location(location);
    }
    if let Some(url) = record.url() {
        ics_event.url(url);
    }

    // Always written, the diff compares it
    ics_event.add_property("STATUS", record.status().as_ics_str());

    if let Some(source) = record.source() {
        ics_event.add_property(X_EVENT_SOURCE, source);
    }
    if let Some(source_id) = record.source_id() {
        ics_event.add_property(X_SOURCE_ID, source_id);
    }

    cal.push(ics_event.done());
    cal.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_test_record() -> EventRecord {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 22, 30, 0).unwrap();
        EventRecord::new("NYC Systems Talk - Jane Doe", start, start + Duration::hours(2))
            .unwrap()
    }

    #[test]
    fn test_generate_ics_required_fields() {
        let ics = generate_ics(&make_test_record(), "abc-123");

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"), "ICS:\n{}", ics);
        assert!(ics.ends_with("END:VCALENDAR\r\n"), "ICS:\n{}", ics);
        assert!(ics.contains("UID:abc-123\r\n"));
        assert!(ics.contains("SUMMARY:NYC Systems Talk - Jane Doe\r\n"));
        assert!(ics.contains("DTSTART:20250320T223000Z\r\n"));
        assert!(ics.contains("DTEND:20250321T003000Z\r\n"));
        assert!(ics.contains("STATUS:TENTATIVE\r\n"));
    }

    #[test]
    fn test_generate_ics_omits_absent_optional_fields() {
        let ics = generate_ics(&make_test_record(), "abc-123");

        for absent in ["DESCRIPTION", "LOCATION", "URL", X_EVENT_SOURCE, X_SOURCE_ID] {
            assert!(
                !ics.lines().any(|l| l.starts_with(absent)),
                "{} should be omitted. ICS:\n{}",
                absent,
                ics
            );
        }
    }

    #[test]
    fn test_generate_ics_escapes_free_text() {
        let record = make_test_record()
            .with_description("Doors at 6:30,\nTalk at 7".to_string())
            .with_location("Trail of Bits Office, New York".to_string())
            .with_url("https://nycsystems.xyz/jane-doe.html".to_string())
            .with_confirmed(true)
            .with_source("nycsystems".to_string(), "nycsystems_20250320".to_string());

        let ics = generate_ics(&record, "abc-123");

        assert!(ics.contains("DESCRIPTION:Doors at 6:30\\,\\nTalk at 7\r\n"), "ICS:\n{}", ics);
        assert!(ics.contains("LOCATION:Trail of Bits Office\\, New York\r\n"));
        assert!(ics.contains("URL:https://nycsystems.xyz/jane-doe.html\r\n"));
        assert!(ics.contains("STATUS:CONFIRMED\r\n"));
        assert!(ics.contains("X-EVENT-SOURCE:nycsystems\r\n"));
        assert!(ics.contains("X-SOURCE-ID:nycsystems_20250320\r\n"));
    }

    #[test]
    fn test_generate_ics_folds_long_descriptions() {
        let record = make_test_record().with_description("systems ".repeat(40));
        let ics = generate_ics(&record, "abc-123");

        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "Line too long ({}): {}", line.len(), line);
        }
        assert!(ics.contains("\r\n "), "Expected a folded line. ICS:\n{}", ics);
    }
}
