//! Core types for calsync.
//!
//! This crate holds everything with real decision logic:
//! - `EventRecord`, the normalized unit every source produces
//! - `similarity` for deciding whether two entries are the same occurrence
//! - `ics` for reading and writing calendar entries
//! - `store` with the `CalendarStore` trait and an in-memory store
//! - `engine` with the `Reconciler` that converges the two calendars
//! - `source` with the `EventSource` trait and the `Aggregator`

pub mod calendar;
pub mod date_range;
pub mod diff;
pub mod engine;
pub mod error;
pub mod event;
pub mod ics;
pub mod similarity;
pub mod source;
pub mod store;

pub use calendar::{CalendarHandle, CalendarKind, CalendarNames};
pub use engine::{Action, Reconciler, RecordOutcome, RunReport};
pub use error::{SyncError, SyncResult};
pub use event::{EventRecord, EventStatus, EventTime};
pub use source::{Aggregator, EventSource};
pub use store::{CalendarStore, StoredEntry, StoredEvent};
