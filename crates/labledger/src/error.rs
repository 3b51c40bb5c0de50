//! Error types for the Kernel.

use labledger_core::ValidationError;
use labledger_store::StoreError;
use labledger_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Kernel operations.
///
/// A stale correction is not an error; see
/// [`CorrectionOutcome::Conflict`](crate::CorrectionOutcome::Conflict).
#[derive(Debug, Error)]
pub enum KernelError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The caller's domain write failed. Nothing was committed.
    #[error("domain write failed: {0:#}")]
    Domain(#[source] anyhow::Error),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
