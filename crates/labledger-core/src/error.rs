//! Error types for the Labledger core.

use thiserror::Error;

/// Core errors that can occur while decoding records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid JSON payload: {0}")]
    InvalidPayload(String),

    #[error("invalid event hash: {0}")]
    InvalidHash(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Input rejected before any transaction is opened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} is too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid cursor: {0}")]
    InvalidCursor(i64),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidPayload(e.to_string())
    }
}
