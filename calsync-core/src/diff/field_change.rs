use std::fmt;

/// One differing field between a stored entry and an incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub stored: Option<String>,
    pub incoming: Option<String>,
}

impl FieldChange {
    pub fn new(field: &'static str, stored: Option<String>, incoming: Option<String>) -> Self {
        FieldChange {
            field,
            stored,
            incoming,
        }
    }

    pub(crate) fn push_if_differs(
        changes: &mut Vec<FieldChange>,
        field: &'static str,
        stored: Option<String>,
        incoming: Option<String>,
    ) {
        if stored != incoming {
            changes.push(FieldChange::new(field, stored, incoming));
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stored, &self.incoming) {
            (Some(old), Some(new)) => write!(f, "{}: \"{}\" → \"{}\"", self.field, old, new),
            (Some(old), None) => write!(f, "{}: \"{}\" → (removed)", self.field, old),
            (None, Some(new)) => write!(f, "{}: (added) \"{}\"", self.field, new),
            (None, None) => write!(f, "{}: (unchanged)", self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_change_shape() {
        let updated = FieldChange::new("LOCATION", Some("A".into()), Some("B".into()));
        let removed = FieldChange::new("URL", Some("https://x".into()), None);
        let added = FieldChange::new("DESCRIPTION", None, Some("Doors at 6".into()));

        assert_eq!(updated.to_string(), "LOCATION: \"A\" → \"B\"");
        assert_eq!(removed.to_string(), "URL: \"https://x\" → (removed)");
        assert_eq!(added.to_string(), "DESCRIPTION: (added) \"Doors at 6\"");
    }
}
