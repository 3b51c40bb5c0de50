//! Error types for the store module.

use labledger_core::{CoreError, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database error annotated with the operation that failed.
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Input rejected before the transaction opened.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Payload serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data in {table} row {row}: {reason}")]
    InvalidData {
        table: &'static str,
        row: i64,
        reason: String,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task running the query failed.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Attach operation context to rusqlite results.
pub(crate) trait ResultExt<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for rusqlite::Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| StoreError::Context { context, source })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
