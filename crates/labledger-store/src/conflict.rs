//! Conflict artifact persistence.

use rusqlite::{params, Connection, Row, Transaction};

use labledger_core::{
    canonical_json, validate_conflict_artifact, ConflictArtifact, NewConflictArtifact, Timestamp,
    ValidationError,
};

use crate::error::{Result, ResultExt, StoreError};

/// Record a rejected write inside the caller's transaction.
pub fn insert_conflict_artifact(
    tx: &Transaction<'_>,
    artifact: NewConflictArtifact,
) -> Result<ConflictArtifact> {
    validate_conflict_artifact(&artifact)?;

    let stored = ConflictArtifact {
        conflict_artifact_id: uuid::Uuid::new_v4().to_string(),
        owner_user_id: artifact.owner_user_id,
        actor_user_id: artifact.actor_user_id,
        device_id: artifact.device_id,
        experiment_id: artifact.experiment_id,
        action_type: artifact.action_type,
        client_base_entry_id: artifact.client_base_entry_id,
        server_latest_entry_id: artifact.server_latest_entry_id,
        payload: artifact.payload,
        created_at: Timestamp::now(),
    };

    tx.execute(
        "INSERT INTO conflict_artifacts (
            conflict_artifact_id, owner_user_id, actor_user_id, device_id,
            experiment_id, action_type, client_base_entry_id,
            server_latest_entry_id, payload, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            stored.conflict_artifact_id,
            stored.owner_user_id,
            stored.actor_user_id,
            stored.device_id,
            stored.experiment_id,
            stored.action_type,
            stored.client_base_entry_id,
            stored.server_latest_entry_id,
            canonical_json(&stored.payload),
            stored.created_at.as_micros(),
        ],
    )
    .context("insert conflict artifact")?;

    tracing::info!(
        conflict_artifact_id = %stored.conflict_artifact_id,
        experiment_id = %stored.experiment_id,
        client_base = ?stored.client_base_entry_id,
        server_latest = ?stored.server_latest_entry_id,
        "recorded conflict artifact"
    );
    Ok(stored)
}

/// List an owner's conflict artifacts in creation order, optionally for one
/// experiment.
pub fn list_conflict_artifacts(
    conn: &Connection,
    owner_user_id: &str,
    experiment_id: Option<&str>,
) -> Result<Vec<ConflictArtifact>> {
    if owner_user_id.trim().is_empty() {
        return Err(ValidationError::MissingField("owner_user_id").into());
    }

    let mut stmt = conn
        .prepare_cached(
            "SELECT rowid AS seq, conflict_artifact_id, owner_user_id, actor_user_id, device_id,
                    experiment_id, action_type, client_base_entry_id,
                    server_latest_entry_id, payload, created_at
             FROM conflict_artifacts
             WHERE owner_user_id = ?1 AND (?2 IS NULL OR experiment_id = ?2)
             ORDER BY created_at ASC, rowid ASC",
        )
        .context("list conflict artifacts")?;

    let rows = stmt
        .query_map(params![owner_user_id, experiment_id], read_row)
        .context("list conflict artifacts")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("list conflict artifacts")?;

    rows.into_iter()
        .map(|(rowid, mut artifact, payload)| {
            artifact.payload =
                serde_json::from_str(&payload).map_err(|e| StoreError::InvalidData {
                    table: "conflict_artifacts",
                    row: rowid,
                    reason: format!("payload: {e}"),
                })?;
            Ok(artifact)
        })
        .collect()
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(i64, ConflictArtifact, String)> {
    let artifact = ConflictArtifact {
        conflict_artifact_id: row.get("conflict_artifact_id")?,
        owner_user_id: row.get("owner_user_id")?,
        actor_user_id: row.get("actor_user_id")?,
        device_id: row.get("device_id")?,
        experiment_id: row.get("experiment_id")?,
        action_type: row.get("action_type")?,
        client_base_entry_id: row.get("client_base_entry_id")?,
        server_latest_entry_id: row.get("server_latest_entry_id")?,
        payload: serde_json::Value::Null,
        created_at: Timestamp::from_micros(row.get("created_at")?),
    };
    Ok((row.get("seq")?, artifact, row.get("payload")?))
}
