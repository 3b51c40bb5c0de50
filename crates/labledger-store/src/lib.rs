//! # Labledger Store
//!
//! SQLite persistence for the Labledger integrity core: the hash-chained
//! audit ledger, the cursor-ordered sync event log and conflict artifacts.
//!
//! ## Overview
//!
//! Reads and standalone appends go through the async [`Store`] trait.
//! Writes that must commit together with a domain change go through
//! [`SqliteStore::transaction`], whose closure receives a [`StoreTx`]:
//!
//! ```rust,no_run
//! use labledger_core::{NewAuditEvent, NewSyncEvent};
//! use labledger_store::{SqliteStore, StoreError};
//!
//! async fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("labledger.db")?;
//!
//!     let cursor = store
//!         .transaction(|tx| {
//!             tx.connection()
//!                 .execute("UPDATE experiments SET title = 'v2' WHERE id = 'x1'", [])?;
//!             tx.append_audit_event(NewAuditEvent::new("experiment.update", "experiment"))?;
//!             tx.append_sync_event(NewSyncEvent::new("u1", "experiment.updated", "experiment"))
//!         })
//!         .await?;
//!     println!("committed at cursor {cursor}");
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append-only**: triggers reject UPDATE and DELETE on all three tables
//! - **Ledger lock**: every audit append first writes the `audit_chain` row in
//!   `ledger_locks`, then reads the chain head
//! - **Immediate transactions**: writers take SQLite's write lock at BEGIN
//! - **Lookahead-row paging**: pulls fetch `limit + 1` rows to compute `has_more`

pub mod audit;
pub mod conflict;
pub mod error;
pub mod migration;
pub mod sqlite;
pub mod sync_log;
pub mod traits;

pub use error::{Result, StoreError};
pub use sqlite::{SqliteStore, StoreConfig, StoreTx};
pub use traits::{Store, StoreExt};
