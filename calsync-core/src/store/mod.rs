//! Calendar store capability.
//!
//! The engine talks to the calendar server exclusively through
//! [`CalendarStore`]. Entries come back as [`StoredEntry`] values carrying the
//! normalized view of the fields the engine controls.

pub mod memory;

use async_trait::async_trait;

use crate::calendar::CalendarHandle;
use crate::date_range::DateRange;
use crate::error::SyncResult;
use crate::event::{EventStatus, EventTime};

pub use memory::MemoryStore;

/// Per-calendar search, insert and delete.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Resolve a calendar by display name, creating it when absent.
    async fn find_or_create_calendar(&self, name: &str) -> SyncResult<CalendarHandle>;

    /// Entries whose time span intersects `range`.
    ///
    /// Entries without a readable start are skipped.
    async fn search(
        &self,
        calendar: &CalendarHandle,
        range: &DateRange,
    ) -> SyncResult<Vec<StoredEntry>>;

    /// Store a serialized calendar object in `calendar`.
    async fn insert(&self, calendar: &CalendarHandle, ics: &str) -> SyncResult<()>;

    /// Remove an entry previously returned by `search`.
    async fn delete(&self, entry: &StoredEntry) -> SyncResult<()>;
}

/// An entry as returned by a store search.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Display name of the calendar the entry was found in
    pub calendar: String,
    /// Resource location on the store; not stable across updates
    pub href: String,
    pub etag: Option<String>,
    pub event: StoredEvent,
}

/// Normalized view of a stored calendar object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredEvent {
    pub uid: Option<String>,
    /// SUMMARY, empty when the entry has none
    pub summary: String,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub status: Option<EventStatus>,
    pub source: Option<String>,
    pub source_id: Option<String>,
}
