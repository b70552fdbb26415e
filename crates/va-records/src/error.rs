//! Error types for record store operations.

use thiserror::Error;
use va_core::ValueError;

/// Result type for record store operations.
pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    /// Malformed descriptor; fatal at startup.
    #[error("Cannot construct record '{point}': {reason}")]
    Construction { point: String, reason: String },

    /// Field name not present in the store.
    #[error("Unknown field: {name}")]
    UnknownField { name: String },

    /// Value does not fit the field kind.
    #[error(transparent)]
    Validation(#[from] ValueError),
}

impl RecordError {
    pub(crate) fn construction(point: &str, reason: impl Into<String>) -> Self {
        RecordError::Construction {
            point: point.to_string(),
            reason: reason.into(),
        }
    }
}
