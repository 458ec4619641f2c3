//! Reconciliation of event records against the two managed calendars.
//!
//! Each record is handled on its own: look around its start time in both
//! calendars, remove copies from the calendar it does not belong in, then
//! bring its own calendar to exactly one field-equal entry. Nothing is
//! persisted between runs; the calendars are the only state.

mod report;

pub use report::{Action, RecordOutcome, RunReport};

use chrono::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::calendar::{CalendarHandle, CalendarKind, CalendarNames};
use crate::date_range::DateRange;
use crate::diff::{FieldChange, record_changes};
use crate::error::SyncResult;
use crate::event::EventRecord;
use crate::ics::generate_ics;
use crate::similarity::find_matches;
use crate::store::{CalendarStore, StoredEntry};

/// Entries are looked up within this many days either side of a record's start.
pub const SEARCH_WINDOW_DAYS: i64 = 1;

pub struct Reconciler<'a, S: CalendarStore + ?Sized> {
    store: &'a S,
    confirmed: CalendarHandle,
    possible: CalendarHandle,
    threshold: f64,
}

/// State of the target calendar with respect to one record.
#[derive(Debug)]
enum TargetState<'e> {
    Absent,
    Unchanged,
    Changed {
        entry: &'e StoredEntry,
        changes: Vec<FieldChange>,
    },
    /// More than one entry matched; the calendar holds duplicates
    Ambiguous(Vec<&'e StoredEntry>),
}

impl<'e> TargetState<'e> {
    fn classify(record: &EventRecord, matches: Vec<&'e StoredEntry>) -> Self {
        match matches.as_slice() {
            [] => TargetState::Absent,
            [entry] => {
                let changes = record_changes(record, &entry.event);
                if changes.is_empty() {
                    TargetState::Unchanged
                } else {
                    TargetState::Changed { entry, changes }
                }
            }
            _ => TargetState::Ambiguous(matches),
        }
    }
}

impl<'a, S: CalendarStore + ?Sized> Reconciler<'a, S> {
    /// Resolve (creating if needed) both calendars once for the whole run.
    pub async fn connect(store: &'a S, names: &CalendarNames, threshold: f64) -> SyncResult<Self> {
        let confirmed = store.find_or_create_calendar(&names.confirmed).await?;
        let possible = store.find_or_create_calendar(&names.possible).await?;
        debug!(confirmed = %confirmed.href, possible = %possible.href, "Resolved calendars");

        Ok(Reconciler {
            store,
            confirmed,
            possible,
            threshold,
        })
    }

    pub fn calendar(&self, kind: CalendarKind) -> &CalendarHandle {
        match kind {
            CalendarKind::Confirmed => &self.confirmed,
            CalendarKind::Possible => &self.possible,
        }
    }

    /// Reconcile every record in order. A record that fails is logged and
    /// counted; the remaining records are still processed.
    pub async fn run(&self, records: &[EventRecord]) -> RunReport {
        let mut report = RunReport::default();

        for record in records {
            match self.reconcile(record).await {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    let calendar = self.calendar(CalendarKind::for_record(record));
                    error!(
                        title = record.title(),
                        calendar = %calendar,
                        error = %e,
                        "Failed to reconcile event"
                    );
                    report.record_failure();
                }
            }
        }

        info!("{}", report);
        report
    }

    /// Bring both calendars in line with a single record.
    pub async fn reconcile(&self, record: &EventRecord) -> SyncResult<RecordOutcome> {
        let target_kind = CalendarKind::for_record(record);
        let target = self.calendar(target_kind);
        let other = self.calendar(target_kind.other());

        let window = DateRange::around(record.start(), Duration::days(SEARCH_WINDOW_DAYS));
        let target_entries = self.store.search(target, &window).await?;
        let other_entries = self.store.search(other, &window).await?;
        debug!(
            title = record.title(),
            target = target_entries.len(),
            other = other_entries.len(),
            "Searched window"
        );

        let removed_from_other = self.remove_from_other(record, other, &other_entries).await;

        let matches = find_matches(record, &target_entries, self.threshold);
        let action = match TargetState::classify(record, matches) {
            TargetState::Absent => {
                self.insert(record, target).await?;
                info!(title = record.title(), calendar = %target, "Inserted event");
                Action::Inserted
            }
            TargetState::Unchanged => {
                debug!(title = record.title(), calendar = %target, "Event unchanged");
                Action::Unchanged
            }
            TargetState::Changed { entry, changes } => {
                let summary = changes
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                self.delete_each(record, &[entry]).await;
                self.insert(record, target).await?;
                info!(title = record.title(), calendar = %target, changes = %summary, "Updated event");
                Action::Updated
            }
            TargetState::Ambiguous(entries) => {
                warn!(
                    title = record.title(),
                    calendar = %target,
                    matches = entries.len(),
                    "Multiple entries match one event, repairing"
                );
                let removed = self.delete_each(record, &entries).await;
                self.insert(record, target).await?;
                Action::Repaired { removed }
            }
        };

        Ok(RecordOutcome {
            target: target_kind,
            removed_from_other,
            action,
        })
    }

    /// Delete copies of `record` from the calendar it does not belong in.
    async fn remove_from_other(
        &self,
        record: &EventRecord,
        other: &CalendarHandle,
        entries: &[StoredEntry],
    ) -> usize {
        let matches = find_matches(record, entries, self.threshold);
        let removed = self.delete_each(record, &matches).await;
        if removed > 0 {
            info!(
                title = record.title(),
                calendar = %other,
                removed,
                "Removed event from other calendar"
            );
        }
        removed
    }

    /// Delete every entry, returning how many went. A failed delete is
    /// logged and skipped; the next run sees the survivor and repairs it.
    async fn delete_each(&self, record: &EventRecord, entries: &[&StoredEntry]) -> usize {
        let mut removed = 0;
        for entry in entries {
            match self.store.delete(entry).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(
                        title = record.title(),
                        calendar = %entry.calendar,
                        href = %entry.href,
                        error = %e,
                        "Could not delete entry"
                    );
                }
            }
        }
        removed
    }

    async fn insert(&self, record: &EventRecord, calendar: &CalendarHandle) -> SyncResult<()> {
        let uid = Uuid::new_v4().to_string();
        self.store.insert(calendar, &generate_ics(record, &uid)).await
    }
}
