//! Audit ledger persistence: locked append, paged export, full verification.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use labledger_core::{
    canonical_json, validate_audit_event, AuditEvent, BreakReason, ChainVerification,
    ChainVerifier, EventHash, NewAuditEvent, Timestamp,
};

use crate::error::{Result, ResultExt, StoreError};
use crate::migration::AUDIT_CHAIN_LOCK;

/// Largest page [`list_audit_events`] returns; larger limits are clamped.
pub const MAX_AUDIT_PAGE: usize = 1000;

const AUDIT_COLUMNS: &str = "id, event_id, actor_id, event_type, entity_type, entity_id,
     payload, created_at, prev_hash, event_hash";

/// Take a named ledger lock for the rest of the transaction.
///
/// The lock is a write to a sentinel row. SQLite holds the database write
/// lock until commit or rollback, so a second appender (another connection or
/// another process) blocks here until the first transaction ends.
pub fn acquire_ledger_lock(tx: &Transaction<'_>, name: &str, now: Timestamp) -> Result<()> {
    let updated = tx
        .execute(
            "UPDATE ledger_locks SET acquired_at = ?2 WHERE name = ?1",
            params![name, now.as_micros()],
        )
        .context("acquire ledger lock")?;

    if updated != 1 {
        return Err(StoreError::Migration(format!("ledger lock {name:?} is missing")));
    }
    Ok(())
}

/// Append an event to the audit chain inside the caller's transaction.
///
/// Reads the chain head only after the ledger lock is held, so no two appends
/// can observe the same previous hash.
pub fn append_audit_event(tx: &Transaction<'_>, event: NewAuditEvent) -> Result<AuditEvent> {
    validate_audit_event(&event)?;

    let now = Timestamp::now();
    acquire_ledger_lock(tx, AUDIT_CHAIN_LOCK, now)?;

    let head: Option<(i64, String)> = tx
        .query_row(
            "SELECT id, event_hash FROM audit_events ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("read audit chain head")?;

    let prev_hash = match head {
        Some((id, hex)) => Some(parse_stored_hash(&hex).map_err(|reason| {
            StoreError::InvalidData {
                table: "audit_events",
                row: id,
                reason,
            }
        })?),
        None => None,
    };

    let event_id = uuid::Uuid::new_v4().to_string();
    let mut sealed = event.seal(0, event_id, now, prev_hash);

    tx.execute(
        "INSERT INTO audit_events (
            event_id, actor_id, event_type, entity_type, entity_id,
            payload, created_at, prev_hash, event_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sealed.event_id,
            sealed.actor_id,
            sealed.event_type,
            sealed.entity_type,
            sealed.entity_id,
            canonical_json(&sealed.payload),
            sealed.created_at.as_micros(),
            sealed.prev_hash.map(|h| h.to_hex()),
            sealed.event_hash.to_hex(),
        ],
    )
    .context("append audit event")?;
    sealed.id = tx.last_insert_rowid();

    tracing::debug!(
        id = sealed.id,
        event_type = %sealed.event_type,
        entity_type = %sealed.entity_type,
        event_hash = %sealed.event_hash,
        "appended audit event"
    );
    Ok(sealed)
}

/// Read up to `limit` audit events with `id > after_id` in ascending order.
///
/// `limit` is clamped to [`MAX_AUDIT_PAGE`]; page through a large ledger by
/// passing the last id seen as `after_id`.
pub fn list_audit_events(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<AuditEvent>> {
    let limit = limit.min(MAX_AUDIT_PAGE) as i64;
    let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_events WHERE id > ?1 ORDER BY id ASC LIMIT ?2");
    let mut stmt = conn.prepare(&sql).context("list audit events")?;
    let rows = stmt
        .query_map(params![after_id, limit], AuditRow::from_row)
        .context("list audit events")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("list audit events")?;

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            row.decode().map_err(|(_, reason)| StoreError::InvalidData {
                table: "audit_events",
                row: id,
                reason,
            })
        })
        .collect()
}

/// Scan the whole chain once, in sequence order, stopping at the first break.
///
/// Reads only. Call inside a read transaction for a consistent snapshot.
pub fn verify_audit_chain(conn: &Connection) -> Result<ChainVerification> {
    let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_events ORDER BY id ASC");
    let mut stmt = conn.prepare(&sql).context("verify audit chain")?;
    let mut rows = stmt.query([]).context("verify audit chain")?;

    let mut verifier = ChainVerifier::new();
    while let Some(row) = rows.next().context("verify audit chain")? {
        let raw = AuditRow::from_row(row).context("verify audit chain")?;
        let id = raw.id;
        let accepted = match raw.decode() {
            Ok(event) => verifier.check(&event),
            Err((reason, _)) => verifier.record_break(id, reason),
        };
        if !accepted {
            break;
        }
    }

    let result = verifier.finish();
    match result.chain_break() {
        None => tracing::info!(checked = result.checked_events, "audit chain verified"),
        Some(b) => tracing::warn!(
            checked = result.checked_events,
            broken_at = b.event_id,
            reason = %b.reason,
            "audit chain broken"
        ),
    }
    Ok(result)
}

/// Stored hashes must be exactly the lowercase hex we write.
fn parse_stored_hash(hex: &str) -> std::result::Result<EventHash, String> {
    let hash = EventHash::from_hex(hex).map_err(|e| e.to_string())?;
    if hash.to_hex() != hex {
        return Err("hash is not in canonical lowercase hex".into());
    }
    Ok(hash)
}

/// An `audit_events` row as stored, before decoding.
struct AuditRow {
    id: i64,
    event_id: String,
    actor_id: Option<String>,
    event_type: String,
    entity_type: String,
    entity_id: Option<String>,
    payload: String,
    created_at: i64,
    prev_hash: Option<String>,
    event_hash: String,
}

impl AuditRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            actor_id: row.get("actor_id")?,
            event_type: row.get("event_type")?,
            entity_type: row.get("entity_type")?,
            entity_id: row.get("entity_id")?,
            payload: row.get("payload")?,
            created_at: row.get("created_at")?,
            prev_hash: row.get("prev_hash")?,
            event_hash: row.get("event_hash")?,
        })
    }

    /// Decode into an event. The error names the break a verifier should
    /// report for an undecodable row.
    fn decode(self) -> std::result::Result<AuditEvent, (BreakReason, String)> {
        let prev_hash = self
            .prev_hash
            .as_deref()
            .map(parse_stored_hash)
            .transpose()
            .map_err(|e| (BreakReason::PrevHashMismatch, format!("prev_hash: {e}")))?;
        let event_hash = parse_stored_hash(&self.event_hash)
            .map_err(|e| (BreakReason::EventHashMismatch, format!("event_hash: {e}")))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| (BreakReason::EventHashMismatch, format!("payload: {e}")))?;

        Ok(AuditEvent {
            id: self.id,
            event_id: self.event_id,
            actor_id: self.actor_id,
            event_type: self.event_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            payload,
            created_at: Timestamp::from_micros(self.created_at),
            prev_hash,
            event_hash,
        })
    }
}
