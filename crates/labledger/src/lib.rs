//! # Labledger
//!
//! The integrity and sync core for a lab notebook service: a tamper-evident
//! audit ledger, a cursor-ordered sync log, and explicit conflict artifacts
//! for stale writes.
//!
//! ## Overview
//!
//! Every state-changing action commits three things in one transaction:
//!
//! - **Domain write**: whatever the caller changes in its own tables
//! - **Audit event**: a link of a SHA-256 hash chain; verifiable end to end
//! - **Sync event**: an entry of the per-owner log devices pull or stream from
//!
//! A correction whose base entry is no longer current is not written. It
//! produces a [`ConflictArtifact`](core::ConflictArtifact) instead, announced
//! through the sync log like any other change.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use labledger::{ActionRecord, Kernel, KernelConfig};
//! use labledger::core::{Cursor, NewAuditEvent};
//! use serde_json::json;
//!
//! async fn example() -> labledger::Result<()> {
//!     let kernel = Kernel::open("labledger.db", KernelConfig::default())?;
//!
//!     kernel
//!         .record_audit(NewAuditEvent::new("auth.login", "user").actor("u1"))
//!         .await?;
//!
//!     let action = ActionRecord::new("u1", "experiment.created", "experiment")
//!         .entity_id("x1")
//!         .payload(json!({"title": "Buffer pH sweep"}));
//!     kernel
//!         .commit_action(action, |conn| {
//!             conn.execute("INSERT INTO experiments (id) VALUES ('x1')", [])?;
//!             Ok(())
//!         })
//!         .await?;
//!
//!     let page = kernel.pull("u1", Cursor::START, None).await?;
//!     assert!(!page.events.is_empty());
//!
//!     let verification = kernel.verify_chain().await?;
//!     assert!(verification.valid);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `labledger::core` - Records, hashing, canonical JSON, verification
//! - `labledger::store` - SQLite persistence and the `Store` trait
//! - `labledger::sync` - Push streams and transports

pub mod error;
pub mod kernel;

// Re-export component crates
pub use labledger_core as core;
pub use labledger_store as store;
pub use labledger_sync as sync;

// Re-export main types for convenience
pub use error::{KernelError, Result};
pub use kernel::{
    ActionRecord, Committed, CorrectionOutcome, CorrectionRequest, CorrectionWriter, Kernel,
    KernelConfig, StreamHandle, CONFLICT_ARTIFACT, CONFLICT_CREATED, CONFLICT_DETECTED,
};

// Re-export commonly used core types
pub use labledger_core::{
    AuditEvent, BreakReason, ChainVerification, ConflictArtifact, Cursor, EventHash, SyncEvent,
    SyncPage,
};
pub use rusqlite::Connection;
