//! The two target calendars.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::EventRecord;

/// Which of the two managed calendars an entry belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarKind {
    Confirmed,
    Possible,
}

impl CalendarKind {
    /// The calendar a record's confirmation flag designates as its home.
    pub fn for_record(record: &EventRecord) -> Self {
        if record.is_confirmed() {
            CalendarKind::Confirmed
        } else {
            CalendarKind::Possible
        }
    }

    pub fn other(self) -> Self {
        match self {
            CalendarKind::Confirmed => CalendarKind::Possible,
            CalendarKind::Possible => CalendarKind::Confirmed,
        }
    }
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarKind::Confirmed => write!(f, "confirmed"),
            CalendarKind::Possible => write!(f, "possible"),
        }
    }
}

/// Display names of the two calendars on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarNames {
    #[serde(default = "default_confirmed")]
    pub confirmed: String,
    #[serde(default = "default_possible")]
    pub possible: String,
}

fn default_confirmed() -> String {
    "Confirmed Events".to_string()
}

fn default_possible() -> String {
    "Possible Events".to_string()
}

impl Default for CalendarNames {
    fn default() -> Self {
        CalendarNames {
            confirmed: default_confirmed(),
            possible: default_possible(),
        }
    }
}

/// A resolved calendar on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarHandle {
    /// Display name, used in logs and errors
    pub name: String,
    /// Store-specific location (collection href for CalDAV)
    pub href: String,
}

impl CalendarHandle {
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        CalendarHandle {
            name: name.into(),
            href: href.into(),
        }
    }
}

impl fmt::Display for CalendarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
