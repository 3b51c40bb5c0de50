//! Store trait: the read and standalone-write interface the sync layer and
//! the kernel depend on.
//!
//! Writes that must land together (a domain row, its audit event, its sync
//! event) do not go through this trait. They use
//! [`SqliteStore::transaction`](crate::SqliteStore::transaction), which hands
//! out a [`StoreTx`](crate::StoreTx) bound to one database transaction.

use async_trait::async_trait;
use labledger_core::{
    AuditEvent, ChainVerification, ConflictArtifact, Cursor, NewAuditEvent, SyncEvent, SyncPage,
};

use crate::error::Result;

/// Async interface over the integrity store.
///
/// For SQLite every method runs on the blocking pool via `spawn_blocking`.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Audit Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Append one audit event in its own transaction.
    async fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent>;

    /// Walk the whole chain once and report the first break, if any.
    async fn verify_audit_chain(&self) -> Result<ChainVerification>;

    /// Audit events with `id > after_id`, oldest first, at most
    /// [`MAX_AUDIT_PAGE`](crate::audit::MAX_AUDIT_PAGE) per call.
    async fn list_audit_events(&self, after_id: i64, limit: usize) -> Result<Vec<AuditEvent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Log
    // ─────────────────────────────────────────────────────────────────────────

    /// One page of events visible to `user_id` strictly after `after`.
    ///
    /// `limit` defaults to 100 and is capped at 500. A negative cursor is a
    /// validation error.
    async fn pull_sync_events(
        &self,
        user_id: &str,
        after: Cursor,
        limit: Option<usize>,
    ) -> Result<SyncPage>;

    // ─────────────────────────────────────────────────────────────────────────
    // Conflicts
    // ─────────────────────────────────────────────────────────────────────────

    /// Conflict artifacts owned by `owner_user_id`, oldest first.
    async fn list_conflict_artifacts(
        &self,
        owner_user_id: &str,
        experiment_id: Option<&str>,
    ) -> Result<Vec<ConflictArtifact>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Pull page after page until `has_more` is false.
    ///
    /// Returns every visible event after `after` and the final watermark.
    fn pull_to_head(
        &self,
        user_id: &str,
        after: Cursor,
        page_size: Option<usize>,
    ) -> impl std::future::Future<Output = Result<(Vec<SyncEvent>, Cursor)>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn pull_to_head(
        &self,
        user_id: &str,
        after: Cursor,
        page_size: Option<usize>,
    ) -> Result<(Vec<SyncEvent>, Cursor)> {
        let mut events = Vec::new();
        let mut cursor = after;
        loop {
            let page = self.pull_sync_events(user_id, cursor, page_size).await?;
            cursor = page.cursor;
            events.extend(page.events);
            if !page.has_more {
                return Ok((events, cursor));
            }
        }
    }
}
