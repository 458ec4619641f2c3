//! In-process calendar store.
//!
//! Holds calendar objects in memory with the same search semantics as a
//! CalDAV server. Used for dry runs and throughout the engine tests, where
//! failures can be injected per calendar.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::calendar::CalendarHandle;
use crate::date_range::DateRange;
use crate::error::{SyncError, SyncResult};
use crate::ics::{parse_stored_event, parse_uid};
use crate::store::{CalendarStore, StoredEntry, StoredEvent};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    /// Calendars keyed by display name
    calendars: BTreeMap<String, MemoryCalendar>,
    failing_search: HashSet<String>,
    failing_write: HashSet<String>,
    failing_delete: HashSet<String>,
    mutations: usize,
    next_id: u64,
}

#[derive(Debug)]
struct MemoryCalendar {
    href: String,
    /// Raw calendar objects keyed by href
    objects: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Place a raw calendar object into `calendar` without counting it as a
    /// mutation. Creates the calendar if needed. Returns the entry's href.
    pub fn seed(&self, calendar: &str, ics: &str) -> String {
        let mut state = self.lock();
        state.store_object(calendar, ics)
    }

    /// Every readable entry currently in `calendar`.
    pub fn entries(&self, calendar: &str) -> Vec<StoredEvent> {
        let state = self.lock();
        state
            .calendars
            .get(calendar)
            .map(|cal| {
                cal.objects
                    .values()
                    .filter_map(|ics| parse_stored_event(ics).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of inserts and deletes performed through `CalendarStore`.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    /// Make searches against `calendar` fail until cleared.
    pub fn set_search_failure(&self, calendar: &str, failing: bool) {
        let mut state = self.lock();
        toggle(&mut state.failing_search, calendar, failing);
    }

    /// Make inserts into and deletes from `calendar` fail until cleared.
    pub fn set_write_failure(&self, calendar: &str, failing: bool) {
        let mut state = self.lock();
        toggle(&mut state.failing_write, calendar, failing);
    }

    /// Make deletes from `calendar` fail until cleared; inserts still succeed.
    pub fn set_delete_failure(&self, calendar: &str, failing: bool) {
        let mut state = self.lock();
        toggle(&mut state.failing_delete, calendar, failing);
    }
}

impl State {
    fn calendar_mut(&mut self, name: &str) -> &mut MemoryCalendar {
        self.calendars
            .entry(name.to_string())
            .or_insert_with(|| MemoryCalendar {
                href: format!("/calendars/{}/", slugify(name)),
                objects: BTreeMap::new(),
            })
    }

    fn store_object(&mut self, calendar: &str, ics: &str) -> String {
        self.next_id += 1;
        let id = self.next_id;
        let cal = self.calendar_mut(calendar);
        let file = parse_uid(ics).unwrap_or_else(|| format!("entry-{}", id));
        let mut href = format!("{}{}.ics", cal.href, file);
        if cal.objects.contains_key(&href) {
            href = format!("{}{}-{}.ics", cal.href, file, id);
        }
        cal.objects.insert(href.clone(), ics.to_string());
        href
    }
}

fn toggle(set: &mut HashSet<String>, calendar: &str, on: bool) {
    if on {
        set.insert(calendar.to_string());
    } else {
        set.remove(calendar);
    }
}

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[async_trait]
impl CalendarStore for MemoryStore {
    async fn find_or_create_calendar(&self, name: &str) -> SyncResult<CalendarHandle> {
        let mut state = self.lock();
        let href = state.calendar_mut(name).href.clone();
        Ok(CalendarHandle::new(name, href))
    }

    async fn search(
        &self,
        calendar: &CalendarHandle,
        range: &DateRange,
    ) -> SyncResult<Vec<StoredEntry>> {
        let state = self.lock();
        if state.failing_search.contains(&calendar.name) {
            return Err(SyncError::query(&calendar.name, "injected search failure"));
        }

        let Some(cal) = state.calendars.get(&calendar.name) else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for (href, ics) in &cal.objects {
            let event = match parse_stored_event(ics) {
                Ok(event) => event,
                Err(e) => {
                    debug!(href = %href, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let start = event.start.to_utc();
            let end = event.end.map(|e| e.to_utc()).unwrap_or(start);
            if range.overlaps(start, end) {
                found.push(StoredEntry {
                    calendar: calendar.name.clone(),
                    href: href.clone(),
                    etag: None,
                    event,
                });
            }
        }
        Ok(found)
    }

    async fn insert(&self, calendar: &CalendarHandle, ics: &str) -> SyncResult<()> {
        let mut state = self.lock();
        if state.failing_write.contains(&calendar.name) {
            return Err(SyncError::write(&calendar.name, "injected write failure"));
        }
        state.store_object(&calendar.name, ics);
        state.mutations += 1;
        Ok(())
    }

    async fn delete(&self, entry: &StoredEntry) -> SyncResult<()> {
        let mut state = self.lock();
        if state.failing_write.contains(&entry.calendar)
            || state.failing_delete.contains(&entry.calendar)
        {
            return Err(SyncError::write(&entry.calendar, "injected delete failure"));
        }

        let removed = state
            .calendars
            .get_mut(&entry.calendar)
            .and_then(|cal| cal.objects.remove(&entry.href));
        if removed.is_none() {
            return Err(SyncError::write(
                &entry.calendar,
                format!("no entry at {}", entry.href),
            ));
        }
        state.mutations += 1;
        Ok(())
    }
}
