//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL batch
//! that transforms the schema from version N to N+1.

use rusqlite::{Connection, TransactionBehavior};

use labledger_core::Timestamp;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Name of the sentinel row guarding audit chain construction.
pub const AUDIT_CHAIN_LOCK: &str = "audit_chain";

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely, also
/// from several connections racing on the same file.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    for version in (current + 1)..=CURRENT_VERSION {
        apply_migration(&tx, version)?;

        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, Timestamp::now().as_micros()],
        )?;
        tracing::debug!(version, "applied schema migration");
    }

    tx.commit()?;
    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Hash-chained audit ledger
        CREATE TABLE audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            actor_id TEXT,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            payload TEXT NOT NULL,            -- canonical JSON
            created_at INTEGER NOT NULL,      -- Unix microseconds
            prev_hash TEXT,                   -- hex, NULL only for the first event
            event_hash TEXT NOT NULL          -- hex
        );

        -- Cursor-ordered sync log
        CREATE TABLE sync_events (
            cursor INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_user_id TEXT NOT NULL,
            actor_user_id TEXT,
            device_id TEXT,
            event_type TEXT NOT NULL,
            aggregate_type TEXT NOT NULL,
            aggregate_id TEXT,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Rejected stale writes
        CREATE TABLE conflict_artifacts (
            conflict_artifact_id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL,
            actor_user_id TEXT,
            device_id TEXT,
            experiment_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            client_base_entry_id TEXT,
            server_latest_entry_id TEXT,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Named write locks held for the duration of a transaction
        CREATE TABLE ledger_locks (
            name TEXT PRIMARY KEY,
            acquired_at INTEGER NOT NULL DEFAULT 0
        );
        INSERT INTO ledger_locks (name) VALUES ('audit_chain');

        -- Append-only enforcement
        CREATE TRIGGER audit_events_no_update BEFORE UPDATE ON audit_events
        BEGIN SELECT RAISE(ABORT, 'audit_events is append-only'); END;
        CREATE TRIGGER audit_events_no_delete BEFORE DELETE ON audit_events
        BEGIN SELECT RAISE(ABORT, 'audit_events is append-only'); END;
        CREATE TRIGGER sync_events_no_update BEFORE UPDATE ON sync_events
        BEGIN SELECT RAISE(ABORT, 'sync_events is append-only'); END;
        CREATE TRIGGER sync_events_no_delete BEFORE DELETE ON sync_events
        BEGIN SELECT RAISE(ABORT, 'sync_events is append-only'); END;
        CREATE TRIGGER conflict_artifacts_no_update BEFORE UPDATE ON conflict_artifacts
        BEGIN SELECT RAISE(ABORT, 'conflict_artifacts is append-only'); END;
        CREATE TRIGGER conflict_artifacts_no_delete BEFORE DELETE ON conflict_artifacts
        BEGIN SELECT RAISE(ABORT, 'conflict_artifacts is append-only'); END;

        -- Indexes for common queries
        CREATE INDEX idx_sync_owner_cursor ON sync_events(owner_user_id, cursor);
        CREATE INDEX idx_sync_actor_cursor ON sync_events(actor_user_id, cursor);
        CREATE INDEX idx_conflicts_owner ON conflict_artifacts(owner_user_id, experiment_id);
        CREATE INDEX idx_audit_entity ON audit_events(entity_type, entity_id);
        "#,
    )?;

    Ok(())
}
