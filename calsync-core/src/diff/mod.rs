//! Field-level comparison between an incoming record and a stored entry.

mod field_change;

pub use field_change::FieldChange;

use crate::event::{EventRecord, EventTime};
use crate::store::StoredEvent;

/// Fields the engine controls that differ between `stored` and `record`.
///
/// An empty result means the stored entry already reflects the record.
/// Provenance (`X-EVENT-SOURCE`, `X-SOURCE-ID`) and the UID are ignored.
pub fn record_changes(record: &EventRecord, stored: &StoredEvent) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    let title = (!record.title().is_empty()).then(|| record.title().to_string());
    let summary = (!stored.summary.is_empty()).then(|| stored.summary.clone());
    FieldChange::push_if_differs(&mut changes, "SUMMARY", summary, title);

    let start = EventTime::DateTime(record.start());
    if stored.start != start {
        changes.push(FieldChange::new(
            "DTSTART",
            Some(stored.start.to_string()),
            Some(start.to_string()),
        ));
    }

    let end = EventTime::DateTime(record.end());
    if stored.end != Some(end) {
        changes.push(FieldChange::new(
            "DTEND",
            stored.end.map(|e| e.to_string()),
            Some(end.to_string()),
        ));
    }

    FieldChange::push_if_differs(
        &mut changes,
        "DESCRIPTION",
        stored.description.clone(),
        record.description().map(str::to_string),
    );
    FieldChange::push_if_differs(
        &mut changes,
        "LOCATION",
        stored.location.clone(),
        record.location().map(str::to_string),
    );
    FieldChange::push_if_differs(
        &mut changes,
        "URL",
        stored.url.clone(),
        record.url().map(str::to_string),
    );
    FieldChange::push_if_differs(
        &mut changes,
        "STATUS",
        stored.status.map(|s| s.as_ics_str().to_string()),
        Some(record.status().as_ics_str().to_string()),
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventStatus;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn make_record() -> EventRecord {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 22, 30, 0).unwrap();
        EventRecord::new("Rust NYC", start, start + Duration::hours(2))
            .unwrap()
            .with_location("Brooklyn".to_string())
            .with_confirmed(true)
    }

    fn stored_copy(record: &EventRecord) -> StoredEvent {
        StoredEvent {
            uid: Some("uid-1".to_string()),
            summary: record.title().to_string(),
            start: EventTime::DateTime(record.start()),
            end: Some(EventTime::DateTime(record.end())),
            location: record.location().map(str::to_string),
            status: Some(record.status()),
            source: Some("some-other-source".to_string()),
            ..StoredEvent::default()
        }
    }

    #[test]
    fn test_identical_fields_yield_no_changes() {
        let record = make_record();
        assert!(record_changes(&record, &stored_copy(&record)).is_empty());
    }

    #[test]
    fn test_changed_location_and_status_are_reported() {
        let record = make_record();
        let mut stored = stored_copy(&record);
        stored.location = Some("Manhattan".to_string());
        stored.status = Some(EventStatus::Tentative);

        let changes = record_changes(&record, &stored);
        let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["LOCATION", "STATUS"]);
        assert_eq!(changes[0].stored.as_deref(), Some("Manhattan"));
        assert_eq!(changes[0].incoming.as_deref(), Some("Brooklyn"));
    }

    #[test]
    fn test_missing_end_and_status_count_as_changes() {
        let record = make_record();
        let mut stored = stored_copy(&record);
        stored.end = None;
        stored.status = None;

        let fields: Vec<&str> = record_changes(&record, &stored)
            .iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(fields, vec!["DTEND", "STATUS"]);
    }

    #[test]
    fn test_pure_date_start_is_a_change() {
        let record = make_record();
        let mut stored = stored_copy(&record);
        stored.start = EventTime::Date(NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());

        let changes = record_changes(&record, &stored);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "DTSTART");
    }
}
