//! Calendar object generation and parsing.
//!
//! Entries are written as RFC 5545 VCALENDAR text with a single VEVENT and
//! read back, both with the icalendar crate.

mod generate;
mod parse;
mod text;

pub use generate::generate_ics;
pub use parse::{parse_records, parse_stored_event, parse_uid};
pub use text::unescape_text;
