//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur while streaming sync events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Message could not be encoded or decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] labledger_store::StoreError),

    /// Stream parameters rejected before the stream opened.
    #[error("validation error: {0}")]
    ValidationError(#[from] labledger_core::ValidationError),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::InvalidMessage(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
