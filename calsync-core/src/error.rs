//! Error types for calsync.

use thiserror::Error;

/// Errors that can occur while fetching, matching or storing events.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Search in calendar '{calendar}' failed: {message}")]
    StoreQuery { calendar: String, message: String },

    #[error("Write to calendar '{calendar}' failed: {message}")]
    StoreWrite { calendar: String, message: String },

    #[error("Source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn query(calendar: impl Into<String>, message: impl ToString) -> Self {
        SyncError::StoreQuery {
            calendar: calendar.into(),
            message: message.to_string(),
        }
    }

    pub fn write(calendar: impl Into<String>, message: impl ToString) -> Self {
        SyncError::StoreWrite {
            calendar: calendar.into(),
            message: message.to_string(),
        }
    }

    pub fn source_failed(source_name: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Source {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for calsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
