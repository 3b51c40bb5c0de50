//! The sync event log.

use rusqlite::{params, Connection, Row, Transaction};

use labledger_core::{
    canonical_json, clamp_pull_limit, validate_sync_event, Cursor, NewSyncEvent, SyncEvent,
    SyncPage, Timestamp, ValidationError,
};

use crate::error::{Result, ResultExt, StoreError};

/// Append a sync event inside the caller's transaction and return its cursor.
///
/// Cursors come from the table's AUTOINCREMENT key, so they only ever grow and
/// are never reused, even after a rollback.
pub fn append_sync_event(tx: &Transaction<'_>, event: NewSyncEvent) -> Result<Cursor> {
    validate_sync_event(&event)?;

    tx.execute(
        "INSERT INTO sync_events (
            owner_user_id, actor_user_id, device_id, event_type,
            aggregate_type, aggregate_id, payload, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.owner_user_id,
            event.actor_user_id,
            event.device_id,
            event.event_type,
            event.aggregate_type,
            event.aggregate_id,
            canonical_json(&event.payload),
            Timestamp::now().as_micros(),
        ],
    )
    .context("append sync event")?;

    let cursor = Cursor(tx.last_insert_rowid());
    tracing::debug!(
        cursor = cursor.get(),
        owner = %event.owner_user_id,
        event_type = %event.event_type,
        "appended sync event"
    );
    Ok(cursor)
}

/// Fetch the next page of events visible to `user_id` after `after`.
///
/// Asks for one row more than the page size; its presence sets `has_more`.
pub fn pull_sync_events(
    conn: &Connection,
    user_id: &str,
    after: Cursor,
    limit: Option<usize>,
) -> Result<SyncPage> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("user_id").into());
    }
    if after.get() < 0 {
        return Err(ValidationError::InvalidCursor(after.get()).into());
    }
    let limit = clamp_pull_limit(limit);

    let mut stmt = conn
        .prepare_cached(
            "SELECT cursor, owner_user_id, actor_user_id, device_id, event_type,
                    aggregate_type, aggregate_id, payload, created_at
             FROM sync_events
             WHERE cursor > ?1 AND (owner_user_id = ?2 OR actor_user_id = ?2)
             ORDER BY cursor ASC
             LIMIT ?3",
        )
        .context("pull sync events")?;

    let rows = stmt
        .query_map(params![after.get(), user_id, (limit + 1) as i64], read_row)
        .context("pull sync events")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("pull sync events")?;

    let events = rows
        .into_iter()
        .map(|(event, payload)| decode_payload(event, &payload))
        .collect::<Result<Vec<_>>>()?;

    Ok(SyncPage::from_rows(after, events, limit))
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(SyncEvent, String)> {
    let event = SyncEvent {
        cursor: Cursor(row.get("cursor")?),
        owner_user_id: row.get("owner_user_id")?,
        actor_user_id: row.get("actor_user_id")?,
        device_id: row.get("device_id")?,
        event_type: row.get("event_type")?,
        aggregate_type: row.get("aggregate_type")?,
        aggregate_id: row.get("aggregate_id")?,
        payload: serde_json::Value::Null,
        created_at: Timestamp::from_micros(row.get("created_at")?),
    };
    Ok((event, row.get("payload")?))
}

fn decode_payload(mut event: SyncEvent, payload: &str) -> Result<SyncEvent> {
    event.payload = serde_json::from_str(payload).map_err(|e| StoreError::InvalidData {
        table: "sync_events",
        row: event.cursor.get(),
        reason: format!("payload: {e}"),
    })?;
    Ok(event)
}
