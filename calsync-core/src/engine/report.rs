use std::fmt;

use crate::calendar::CalendarKind;

/// What reconciling one record did to its target calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No match existed; a new entry was written
    Inserted,
    /// The single match already carried the record's fields
    Unchanged,
    /// The single match differed and was replaced
    Updated,
    /// Several matches existed; all were removed and one entry written
    Repaired { removed: usize },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Inserted => write!(f, "+"),
            Action::Unchanged => write!(f, "="),
            Action::Updated => write!(f, "~"),
            Action::Repaired { removed } => write!(f, "!{}", removed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub target: CalendarKind,
    /// Matches deleted from the other calendar
    pub removed_from_other: usize,
    pub action: Action,
}

/// Tally of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub repaired: usize,
    /// Records that had copies removed from the wrong calendar
    pub moved: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        match outcome.action {
            Action::Inserted => self.inserted += 1,
            Action::Unchanged => self.unchanged += 1,
            Action::Updated => self.updated += 1,
            Action::Repaired { .. } => self.repaired += 1,
        }
        if outcome.removed_from_other > 0 {
            self.moved += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    /// Whether the run wrote or deleted anything.
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated + self.repaired + self.moved > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} inserted, {} updated, {} unchanged, {} repaired, {} moved, {} failed",
            self.processed,
            self.inserted,
            self.updated,
            self.unchanged,
            self.repaired,
            self.moved,
            self.failed
        )
    }
}
