//! SQLite implementation of the Store trait.
//!
//! This is the only storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use labledger_core::{
    AuditEvent, ChainVerification, ConflictArtifact, Cursor, NewAuditEvent, NewConflictArtifact,
    NewSyncEvent, SyncPage,
};

use crate::error::{Result, ResultExt, StoreError};
use crate::traits::Store;
use crate::{audit, conflict, migration, sync_log};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a writer waits for another connection's write lock.
    pub busy_timeout: Duration,
    /// Use write-ahead logging (file databases only).
    pub wal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            wal: true,
        }
    }
}

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Several `SqliteStore`s (or processes)
/// may open the same file; SQLite's write lock serializes their writers.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path with default settings.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open a SQLite database at the given path.
    pub fn open_with(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path).context("open database")?;
        conn.busy_timeout(config.busy_timeout)
            .context("set busy timeout")?;
        if config.wal {
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .context("enable WAL")?;
            tracing::debug!(journal_mode = %mode, "journal mode set");
        }
        migration::migrate(&mut conn)?;
        tracing::info!(path = %path.display(), "opened store");
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open database")?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` inside one IMMEDIATE transaction on the blocking pool.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err` or
    /// panics. Nothing `f` wrote through the [`StoreTx`] is visible to other
    /// connections before the commit.
    pub async fn transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        let joined = tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let mut guard = lock(&conn);
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("begin transaction")?;
            let store_tx = StoreTx { tx };
            let value = f(&store_tx)?;
            store_tx.tx.commit().context("commit transaction")?;
            Ok(value)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task(e.to_string()).into()),
        }
    }

    /// Run a read-only closure on the blocking pool.
    async fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn);
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// A panic inside a transaction closure poisons the mutex, but the
/// transaction itself was rolled back when it dropped, so the connection is
/// still usable.
fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("recovering store connection after a panicked task");
        poisoned.into_inner()
    })
}

/// Write access to one open transaction.
///
/// Handed to the closure passed to [`SqliteStore::transaction`]. Domain
/// writes go through [`StoreTx::connection`] so they share the transaction
/// with the ledger writes.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    /// Append to the audit chain. Takes the ledger lock first.
    pub fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        audit::append_audit_event(&self.tx, event)
    }

    /// Append to the sync log; returns the new cursor.
    pub fn append_sync_event(&self, event: NewSyncEvent) -> Result<Cursor> {
        sync_log::append_sync_event(&self.tx, event)
    }

    /// Record a rejected write.
    pub fn insert_conflict_artifact(
        &self,
        artifact: NewConflictArtifact,
    ) -> Result<ConflictArtifact> {
        conflict::insert_conflict_artifact(&self.tx, artifact)
    }

    /// The underlying connection, inside the open transaction.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn append_audit_event(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        self.transaction(move |tx| tx.append_audit_event(event)).await
    }

    async fn verify_audit_chain(&self) -> Result<ChainVerification> {
        self.read(|conn| {
            // One read transaction, so concurrent appends do not shift the
            // snapshot mid-scan.
            let tx = conn.transaction().context("begin read")?;
            let result = audit::verify_audit_chain(&tx)?;
            tx.finish().context("end read")?;
            Ok(result)
        })
        .await
    }

    async fn list_audit_events(&self, after_id: i64, limit: usize) -> Result<Vec<AuditEvent>> {
        self.read(move |conn| audit::list_audit_events(conn, after_id, limit))
            .await
    }

    async fn pull_sync_events(
        &self,
        user_id: &str,
        after: Cursor,
        limit: Option<usize>,
    ) -> Result<SyncPage> {
        let user_id = user_id.to_owned();
        self.read(move |conn| sync_log::pull_sync_events(conn, &user_id, after, limit))
            .await
    }

    async fn list_conflict_artifacts(
        &self,
        owner_user_id: &str,
        experiment_id: Option<&str>,
    ) -> Result<Vec<ConflictArtifact>> {
        let owner = owner_user_id.to_owned();
        let experiment = experiment_id.map(str::to_owned);
        self.read(move |conn| {
            conflict::list_conflict_artifacts(conn, &owner, experiment.as_deref())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use labledger_core::BreakReason;
    use serde_json::json;

    fn entry_event(owner: &str, n: i64) -> NewSyncEvent {
        NewSyncEvent::new(owner, "entry.created", "experiment")
            .aggregate_id("exp-1")
            .payload(json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_empty_chain_is_valid() {
        let store = SqliteStore::open_memory().unwrap();
        let result = store.verify_audit_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.checked_events, 0);
    }

    #[tokio::test]
    async fn test_append_and_verify() {
        let store = SqliteStore::open_memory().unwrap();
        for i in 0..10 {
            store
                .append_audit_event(
                    NewAuditEvent::new("entry.create", "entry")
                        .actor("u1")
                        .payload(json!({ "i": i })),
                )
                .await
                .unwrap();
        }
        let result = store.verify_audit_chain().await.unwrap();
        assert!(result.valid);
        assert_eq!(result.checked_events, 10);
    }

    #[tokio::test]
    async fn test_transaction_commits_all_writes() {
        let store = SqliteStore::open_memory().unwrap();
        let (audit, cursor) = store
            .transaction(|tx| -> Result<_> {
                let audit = tx.append_audit_event(NewAuditEvent::new("entry.create", "entry"))?;
                let cursor = tx.append_sync_event(entry_event("u1", 1))?;
                Ok((audit, cursor))
            })
            .await
            .unwrap();
        assert_eq!(audit.id, 1);
        assert_eq!(cursor, Cursor(1));

        let page = store.pull_sync_events("u1", Cursor::START, None).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(store.list_audit_events(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let store = SqliteStore::open_memory().unwrap();
        let result: Result<()> = store
            .transaction(|tx| {
                tx.append_audit_event(NewAuditEvent::new("entry.create", "entry"))?;
                tx.append_sync_event(entry_event("u1", 1))?;
                // Fails validation after two successful writes.
                tx.append_sync_event(entry_event("", 2))?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        assert!(store.list_audit_events(0, 10).await.unwrap().is_empty());
        let page = store.pull_sync_events("u1", Cursor::START, None).await.unwrap();
        assert!(page.is_empty());
        assert!(store.verify_audit_chain().await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_domain_writes_share_the_transaction() {
        let store = SqliteStore::open_memory().unwrap();
        let result: Result<()> = store
            .transaction(|tx| {
                tx.connection()
                    .execute_batch("CREATE TABLE notes (body TEXT NOT NULL)")?;
                tx.connection()
                    .execute("INSERT INTO notes (body) VALUES ('x')", [])?;
                Err(StoreError::Migration("abort".into()))
            })
            .await;
        assert!(result.is_err());

        let exists = store
            .read(|conn| {
                Ok(conn
                    .prepare("SELECT 1 FROM sqlite_master WHERE name = 'notes'")?
                    .exists([])?)
            })
            .await
            .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn test_pull_to_head_drains_pages() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .transaction(|tx| -> Result<()> {
                for n in 0..7 {
                    tx.append_sync_event(entry_event("u1", n))?;
                    tx.append_sync_event(entry_event("u2", n))?;
                }
                Ok(())
            })
            .await
            .unwrap();

        let (events, cursor) = store.pull_to_head("u1", Cursor::START, Some(3)).await.unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(cursor, Cursor(13));
        assert!(events.windows(2).all(|w| w[0].cursor < w[1].cursor));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let first = SqliteStore::open(&path).unwrap();
        let second = SqliteStore::open(&path).unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let store = if i % 2 == 0 { first.clone() } else { second.clone() };
            handles.push(tokio::spawn(async move {
                store
                    .append_audit_event(
                        NewAuditEvent::new("entry.create", "entry").payload(json!({ "i": i })),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let result = first.verify_audit_chain().await.unwrap();
        assert!(result.valid, "{result:?}");
        assert_eq!(result.checked_events, 40);

        let events = second.list_audit_events(0, 100).await.unwrap();
        let mut prevs: Vec<_> = events.iter().filter_map(|e| e.prev_hash).collect();
        prevs.sort_by_key(|h| h.to_hex());
        prevs.dedup();
        assert_eq!(prevs.len(), 39);
    }

    #[tokio::test]
    async fn test_reopen_keeps_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .append_audit_event(NewAuditEvent::new("auth.login", "user"))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let second = store
            .append_audit_event(NewAuditEvent::new("auth.logout", "user"))
            .await
            .unwrap();
        assert_eq!(second.id, 2);
        assert!(second.prev_hash.is_some());
        assert!(store.verify_audit_chain().await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_tamper_on_disk_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();
        for i in 0..3 {
            store
                .append_audit_event(NewAuditEvent::new("note", "entry").payload(json!({ "i": i })))
                .await
                .unwrap();
        }

        let raw = Connection::open(&path).unwrap();
        raw.execute_batch(
            "DROP TRIGGER audit_events_no_update;
             UPDATE audit_events SET actor_id = 'mallory' WHERE id = 3;",
        )
        .unwrap();
        drop(raw);

        let result = store.verify_audit_chain().await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.checked_events, 2);
        assert_eq!(result.broken_at_event_id, Some(3));
        assert_eq!(result.reason, Some(BreakReason::EventHashMismatch));
    }
}
