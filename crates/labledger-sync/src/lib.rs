//! # Labledger Sync
//!
//! Push delivery of the sync event log to connected devices.
//!
//! ## Overview
//!
//! A [`SyncStream`] is a per-connection adapter over
//! [`Store::pull_sync_events`](labledger_store::Store::pull_sync_events). It
//! keeps a watermark cursor, polls on a fixed interval, and pushes what it
//! finds over a [`Transport`]. It never reorders events and keeps no state
//! across connections.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use labledger_core::Cursor;
//! use labledger_store::SqliteStore;
//! use labledger_sync::{memory, StreamConfig, SyncStream};
//! use tokio::sync::watch;
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("labledger.db").unwrap());
//!     let (transport, _client) = memory::pair(64);
//!
//!     let mut stream = SyncStream::new(
//!         store,
//!         Arc::new(transport),
//!         "u1",
//!         Cursor(42),
//!         StreamConfig::default(),
//!     )
//!     .unwrap();
//!
//!     let (_cancel, shutdown) = watch::channel(false);
//!     let report = stream.run(shutdown).await;
//!     println!("closed: {:?} at cursor {}", report.reason, report.cursor);
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Server                               Client
//!   |-------- connected {cursor} ------->|
//!   |          ... poll interval ...     |
//!   |-------- events {cursor, events} -->|
//!   |          ... poll interval ...     |
//!   |-------- heartbeat {cursor} ------->|
//!   |          ... pull fails ...        |
//!   |-------- error {error} ------------>|
//!   |<------- close ---------------------|
//! ```

pub mod error;
pub mod messages;
pub mod stream;
pub mod transport;

pub use error::{Result, SyncError};
pub use messages::{limits, ClientFrame, ServerMessage};
pub use stream::{CloseReason, StreamConfig, StreamPhase, StreamReport, SyncStream};
pub use transport::{memory, memory::MemoryClient, memory::MemoryTransport, Transport};
