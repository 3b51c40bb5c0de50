//! Test fixtures for common scenarios.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tempfile::TempDir;

use labledger::{ActionRecord, CorrectionRequest, CorrectionWriter, Kernel, KernelConfig};

/// A file-backed kernel in a temporary directory.
///
/// Also hands out raw connections to the same file, for inspecting domain
/// tables and for tampering with the ledger the way an attacker with
/// database access would.
pub struct TestLedger {
    _dir: TempDir,
    path: PathBuf,
    kernel: Kernel,
}

impl TestLedger {
    /// Create a ledger with default configuration.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    /// Create a ledger with the given configuration.
    pub fn with_config(config: KernelConfig) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("labledger.db");
        let kernel = Kernel::open(&path, config).expect("open kernel");
        Self {
            _dir: dir,
            path,
            kernel,
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A second kernel over the same file, with its own connection.
    pub fn reopen(&self) -> Kernel {
        Kernel::open(&self.path, self.kernel.config().clone()).expect("reopen kernel")
    }

    /// A raw connection to the database file.
    pub fn raw(&self) -> Connection {
        let conn = Connection::open(&self.path).expect("open raw connection");
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .expect("set busy timeout");
        conn
    }

    /// Commit an `entry.created` action that inserts one entry, returning the
    /// new entry's id.
    pub async fn seed_entry(&self, owner: &str, experiment_id: &str, body: &str) -> String {
        let experiment = experiment_id.to_string();
        let text = body.to_string();
        let action = ActionRecord::new(owner, "entry.created", "experiment")
            .entity_id(experiment_id)
            .payload(json!({ "text": body }));

        self.kernel
            .commit_action(action, move |conn| {
                TableEntries::insert(conn, &experiment, &text)
            })
            .await
            .expect("seed entry")
            .value
    }

    /// Number of entries stored for an experiment.
    pub fn entry_count(&self, experiment_id: &str) -> i64 {
        TableEntries::count(&self.raw(), experiment_id).expect("count entries")
    }

    /// Number of rows in a ledger table.
    pub fn row_count(&self, table: &str) -> i64 {
        self.raw()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tampering
    // ─────────────────────────────────────────────────────────────────────────

    /// Overwrite one text column of a stored audit event, bypassing the
    /// append-only triggers.
    pub fn tamper_audit_column(&self, id: i64, column: &str, value: &str) {
        assert!(
            matches!(
                column,
                "actor_id" | "event_type" | "entity_type" | "entity_id" | "payload" | "prev_hash"
                    | "event_hash"
            ),
            "not a tamperable column: {column}"
        );
        let conn = self.raw();
        conn.execute_batch("DROP TRIGGER IF EXISTS audit_events_no_update")
            .expect("drop update trigger");
        let changed = conn
            .execute(
                &format!("UPDATE audit_events SET {column} = ?2 WHERE id = ?1"),
                params![id, value],
            )
            .expect("tamper audit event");
        assert_eq!(changed, 1, "no audit event with id {id}");
    }

    /// Shift a stored audit event's timestamp by one microsecond.
    pub fn tamper_audit_timestamp(&self, id: i64) {
        let conn = self.raw();
        conn.execute_batch("DROP TRIGGER IF EXISTS audit_events_no_update")
            .expect("drop update trigger");
        conn.execute(
            "UPDATE audit_events SET created_at = created_at + 1 WHERE id = ?1",
            params![id],
        )
        .expect("tamper timestamp");
    }

    /// Flip the first byte of a stored event hash, keeping it valid hex.
    pub fn corrupt_event_hash(&self, id: i64) {
        let stored: String = self
            .raw()
            .query_row(
                "SELECT event_hash FROM audit_events WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .expect("read event hash");
        let mut bytes = hex::decode(stored).expect("stored hash is hex");
        bytes[0] ^= 0xff;
        self.tamper_audit_column(id, "event_hash", &hex::encode(bytes));
    }

    /// Delete a stored audit event, bypassing the append-only triggers.
    pub fn delete_audit_event(&self, id: i64) {
        let conn = self.raw();
        conn.execute_batch("DROP TRIGGER IF EXISTS audit_events_no_delete")
            .expect("drop delete trigger");
        conn.execute("DELETE FROM audit_events WHERE id = ?1", params![id])
            .expect("delete audit event");
    }
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal entries table for exercising corrections.
///
/// The current entry of an experiment is the one inserted last.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEntries;

impl TableEntries {
    pub const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS entries (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_id TEXT NOT NULL UNIQUE,
        experiment_id TEXT NOT NULL,
        body TEXT NOT NULL
    )";

    /// Insert an entry and return its id.
    pub fn insert(conn: &Connection, experiment_id: &str, body: &str) -> anyhow::Result<String> {
        conn.execute_batch(Self::SCHEMA)?;
        let entry_id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO entries (entry_id, experiment_id, body) VALUES (?1, ?2, ?3)",
            params![entry_id, experiment_id, body],
        )?;
        Ok(entry_id)
    }

    /// Number of entries for an experiment; zero if the table doesn't exist.
    pub fn count(conn: &Connection, experiment_id: &str) -> rusqlite::Result<i64> {
        conn.execute_batch(Self::SCHEMA)?;
        conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE experiment_id = ?1",
            params![experiment_id],
            |row| row.get(0),
        )
    }
}

impl CorrectionWriter for TableEntries {
    fn current_entry_id(
        &self,
        conn: &Connection,
        experiment_id: &str,
    ) -> anyhow::Result<Option<String>> {
        conn.execute_batch(Self::SCHEMA)?;
        let current = conn
            .query_row(
                "SELECT entry_id FROM entries WHERE experiment_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(current)
    }

    fn apply(&self, conn: &Connection, request: &CorrectionRequest) -> anyhow::Result<String> {
        Self::insert(conn, &request.experiment_id, &request.payload.to_string())
    }
}
