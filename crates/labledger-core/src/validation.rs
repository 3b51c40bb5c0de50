//! Input validation, run before any transaction opens.

use crate::audit::NewAuditEvent;
use crate::conflict::NewConflictArtifact;
use crate::error::ValidationError;
use crate::sync_event::NewSyncEvent;

/// Maximum length of identifiers and type tags, in bytes.
pub const MAX_TAG_LEN: usize = 256;

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    bounded(field, value)
}

fn bounded(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_TAG_LEN {
        return Err(ValidationError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_TAG_LEN,
        });
    }
    Ok(())
}

fn optional(field: &'static str, value: Option<&str>) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| bounded(field, v))
}

/// Event type and entity type are required.
pub fn validate_audit_event(event: &NewAuditEvent) -> Result<(), ValidationError> {
    required("event_type", &event.event_type)?;
    required("entity_type", &event.entity_type)?;
    optional("actor_id", event.actor_id.as_deref())?;
    optional("entity_id", event.entity_id.as_deref())?;
    Ok(())
}

/// Owner, event type and aggregate type are required.
pub fn validate_sync_event(event: &NewSyncEvent) -> Result<(), ValidationError> {
    required("owner_user_id", &event.owner_user_id)?;
    required("event_type", &event.event_type)?;
    required("aggregate_type", &event.aggregate_type)?;
    optional("actor_user_id", event.actor_user_id.as_deref())?;
    optional("device_id", event.device_id.as_deref())?;
    optional("aggregate_id", event.aggregate_id.as_deref())?;
    Ok(())
}

/// Owner, experiment and action type are required.
pub fn validate_conflict_artifact(artifact: &NewConflictArtifact) -> Result<(), ValidationError> {
    required("owner_user_id", &artifact.owner_user_id)?;
    required("experiment_id", &artifact.experiment_id)?;
    required("action_type", &artifact.action_type)?;
    optional("actor_user_id", artifact.actor_user_id.as_deref())?;
    optional("device_id", artifact.device_id.as_deref())?;
    optional("client_base_entry_id", artifact.client_base_entry_id.as_deref())?;
    optional("server_latest_entry_id", artifact.server_latest_entry_id.as_deref())?;
    Ok(())
}
