//! Calendar object parsing using the icalendar crate's parser.

use chrono::{NaiveDateTime, TimeZone, Utc};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::event::{EventRecord, EventStatus, EventTime};
use crate::ics::generate::{X_EVENT_SOURCE, X_SOURCE_ID};
use crate::ics::text::unescape_text;
use crate::store::StoredEvent;

/// Parse the first VEVENT of a stored calendar object.
pub fn parse_stored_event(content: &str) -> SyncResult<StoredEvent> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| SyncError::Parse(format!("Invalid calendar object: {}", e)))?;

    let vevent = calendar
        .components
        .iter()
        .find(|c| c.name == "VEVENT")
        .ok_or_else(|| SyncError::Parse("Calendar object has no VEVENT".to_string()))?;

    stored_event_from(vevent)
}

/// Normalize every VEVENT of a raw calendar file into records.
///
/// Used by sources that hand out .ics files instead of structured data.
/// Components that cannot be normalized are skipped with a warning.
pub fn parse_records(content: &str, is_confirmed: bool, source: &str) -> SyncResult<Vec<EventRecord>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| SyncError::Parse(format!("Invalid calendar file: {}", e)))?;

    let records = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| match record_from(vevent, is_confirmed, source) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(source, error = %e, "Skipping unreadable VEVENT");
                None
            }
        })
        .collect();

    Ok(records)
}

/// UID of the first VEVENT, if any.
pub fn parse_uid(content: &str) -> Option<String> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;
    text_prop(vevent, "UID")
}

fn stored_event_from(vevent: &Component<'_>) -> SyncResult<StoredEvent> {
    let start = required_time(vevent, "DTSTART")?;
    let end = vevent.find_prop("DTEND").and_then(to_event_time);

    let status = vevent
        .find_prop("STATUS")
        .and_then(|p| EventStatus::from_ics_str(p.val.as_ref()));

    Ok(StoredEvent {
        uid: text_prop(vevent, "UID"),
        summary: text_prop(vevent, "SUMMARY").unwrap_or_default(),
        start,
        end,
        description: text_prop(vevent, "DESCRIPTION"),
        location: text_prop(vevent, "LOCATION"),
        url: raw_prop(vevent, "URL"),
        status,
        source: text_prop(vevent, X_EVENT_SOURCE),
        source_id: text_prop(vevent, X_SOURCE_ID),
    })
}

fn record_from(vevent: &Component<'_>, is_confirmed: bool, source: &str) -> SyncResult<EventRecord> {
    let title = text_prop(vevent, "SUMMARY").unwrap_or_default();
    let start = required_time(vevent, "DTSTART")?.to_utc();
    let end = vevent
        .find_prop("DTEND")
        .and_then(to_event_time)
        .map(|t| t.to_utc())
        .unwrap_or(start);

    let record = EventRecord::new(title, start, end)?
        .with_description(text_prop(vevent, "DESCRIPTION"))
        .with_location(text_prop(vevent, "LOCATION"))
        .with_url(raw_prop(vevent, "URL"))
        .with_confirmed(is_confirmed)
        .with_source(source.to_string(), text_prop(vevent, "UID"));

    Ok(record)
}

fn required_time(vevent: &Component<'_>, name: &str) -> SyncResult<EventTime> {
    let prop = vevent
        .find_prop(name)
        .ok_or_else(|| SyncError::Parse(format!("Missing {}", name)))?;
    to_event_time(prop)
        .ok_or_else(|| SyncError::Parse(format!("Unreadable {} '{}'", name, prop.val)))
}

/// Unescaped TEXT value; empty values count as absent.
fn text_prop(vevent: &Component<'_>, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|s| !s.is_empty())
}

fn raw_prop(vevent: &Component<'_>, name: &str) -> Option<String> {
    vevent
        .find_prop(name)
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Convert DTSTART/DTEND to an `EventTime`, resolving zoned times to UTC.
fn to_event_time(prop: &Property<'_>) -> Option<EventTime> {
    let time = match DatePerhapsTime::try_from(prop).ok()? {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::DateTime(dt),
            // Floating times carry no zone; read them as UTC
            CalendarDateTime::Floating(naive) => EventTime::DateTime(naive.and_utc()),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                EventTime::DateTime(zoned_to_utc(date_time, &tzid))
            }
        },
    };
    Some(time)
}

fn zoned_to_utc(date_time: NaiveDateTime, tzid: &str) -> chrono::DateTime<Utc> {
    match tzid.parse::<chrono_tz::Tz>() {
        Ok(tz) => tz
            .from_local_datetime(&date_time)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| date_time.and_utc()),
        Err(_) => {
            warn!(tzid, "Unknown TZID, reading time as UTC");
            date_time.and_utc()
        }
    }
}
