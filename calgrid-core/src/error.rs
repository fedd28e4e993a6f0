//! Error types for the calgrid core.

use thiserror::Error;

/// Errors that can occur in calgrid operations.
#[derive(Error, Debug)]
pub enum CalError {
    #[error("Calendar parse error: {0}")]
    Parse(String),

    #[error("Event record has no DTSTART")]
    MissingStart,

    #[error("Recurrence rule error: {0}")]
    Recurrence(String),

    #[error("Event '{0}' already present; use replace to update it")]
    DuplicateUid(String),

    #[error("No event with uid '{0}' in this calendar")]
    UnknownUid(String),

    #[error("No writable calendar in this session")]
    NoWritable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for calgrid operations.
pub type CalResult<T> = Result<T, CalError>;
