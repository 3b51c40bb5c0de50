//! The main Kernel implementation.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use labledger_core::{
    check_base, validate_audit_event, validate_conflict_artifact, validate_sync_event,
    AuditEvent, BaseCheck, ChainVerification, ConflictArtifact, Cursor, NewAuditEvent,
    NewConflictArtifact, NewSyncEvent, SyncPage, ValidationError,
};
use labledger_store::{SqliteStore, Store, StoreConfig, StoreError, StoreTx};
use labledger_sync::{StreamConfig, StreamReport, SyncStream, Transport};

use crate::error::{KernelError, Result};

/// Audit event type recorded when a stale correction is rejected.
pub const CONFLICT_DETECTED: &str = "conflict.detected";
/// Sync event type announcing a new conflict artifact.
pub const CONFLICT_CREATED: &str = "conflict.created";
/// Entity and aggregate type of conflict artifacts.
pub const CONFLICT_ARTIFACT: &str = "conflict_artifact";

/// Configuration for the Kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelConfig {
    /// Storage configuration.
    pub store: StoreConfig,
    /// Push stream configuration.
    pub stream: StreamConfig,
}

/// A state-changing action: what the audit ledger and the sync log record
/// about one domain write.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Whose data changed. Sync events are addressed to this user.
    pub owner_user_id: String,
    /// Who made the change, if not the owner.
    pub actor_user_id: Option<String>,
    pub device_id: Option<String>,
    /// Audit and sync event type, e.g. `entry.created`.
    pub event_type: String,
    /// Audit entity type and sync aggregate type, e.g. `experiment`.
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: Value,
}

impl ActionRecord {
    pub fn new(
        owner_user_id: impl Into<String>,
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            actor_user_id: None,
            device_id: None,
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            payload: Value::Null,
        }
    }

    pub fn actor(mut self, actor_user_id: impl Into<String>) -> Self {
        self.actor_user_id = Some(actor_user_id.into());
        self
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// The actor, falling back to the owner.
    fn acting_user(&self) -> &str {
        self.actor_user_id.as_deref().unwrap_or(&self.owner_user_id)
    }

    fn audit_event(&self) -> NewAuditEvent {
        let mut event = NewAuditEvent::new(self.event_type.clone(), self.entity_type.clone())
            .actor(self.acting_user())
            .payload(self.payload.clone());
        event.entity_id = self.entity_id.clone();
        event
    }

    fn sync_event(&self) -> NewSyncEvent {
        NewSyncEvent {
            owner_user_id: self.owner_user_id.clone(),
            actor_user_id: self.actor_user_id.clone(),
            device_id: self.device_id.clone(),
            event_type: self.event_type.clone(),
            aggregate_type: self.entity_type.clone(),
            aggregate_id: self.entity_id.clone(),
            payload: self.payload.clone(),
        }
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_audit_event(&self.audit_event())?;
        validate_sync_event(&self.sync_event())
    }
}

/// What [`Kernel::commit_action`] committed.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    /// The domain write's return value.
    pub value: T,
    pub audit_event: AuditEvent,
    pub cursor: Cursor,
}

/// A proposed correction (addendum) to an experiment's entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRequest {
    pub owner_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub experiment_id: String,
    /// e.g. `entry.addendum`.
    pub action_type: String,
    /// The entry the client believes is current.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_entry_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl CorrectionRequest {
    /// Checks every field either outcome persists. The artifact carries the
    /// whole request, and the applied path stores a subset of it.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_conflict_artifact(&NewConflictArtifact {
            owner_user_id: self.owner_user_id.clone(),
            actor_user_id: self.actor_user_id.clone(),
            device_id: self.device_id.clone(),
            experiment_id: self.experiment_id.clone(),
            action_type: self.action_type.clone(),
            client_base_entry_id: self.base_entry_id.clone(),
            server_latest_entry_id: None,
            payload: Value::Null,
        })
    }
}

/// Result of [`Kernel::submit_correction`].
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionOutcome {
    /// The base was current; the correction was written.
    Applied {
        entry_id: String,
        cursor: Cursor,
        audit_event_id: i64,
    },
    /// The base was stale; nothing was written except the artifact.
    Conflict(ConflictArtifact),
}

impl CorrectionOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CorrectionOutcome::Conflict(_))
    }
}

/// The domain side of a correction: where entries live and how a correction
/// is written. Both methods run inside the kernel's transaction.
pub trait CorrectionWriter: Send + Sync + 'static {
    /// The experiment's current authoritative entry, if any.
    fn current_entry_id(&self, conn: &Connection, experiment_id: &str)
        -> anyhow::Result<Option<String>>;

    /// Write the correction and return the new entry's id.
    fn apply(&self, conn: &Connection, request: &CorrectionRequest) -> anyhow::Result<String>;
}

/// A stream running on its own task.
pub struct StreamHandle {
    cancel: watch::Sender<bool>,
    join: JoinHandle<StreamReport>,
}

impl StreamHandle {
    /// Cancel the stream and wait for it to close.
    pub async fn shutdown(self) -> Result<StreamReport> {
        // Send fails only if the stream already ended.
        let _ = self.cancel.send(true);
        self.join().await
    }

    /// Wait for the stream to end on its own.
    pub async fn join(self) -> Result<StreamReport> {
        self.join
            .await
            .map_err(|e| KernelError::Task(e.to_string()))
    }
}

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Recording audited actions (with or without a domain write)
/// - Submitting corrections with stale-write detection
/// - Verifying the audit chain
/// - Pulling and streaming sync events
///
/// Cloning is cheap; clones share one connection.
#[derive(Clone)]
pub struct Kernel {
    /// The storage backend.
    store: Arc<SqliteStore>,
    /// Configuration.
    config: KernelConfig,
}

impl Kernel {
    /// Create a kernel over an open store.
    pub fn new(store: SqliteStore, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    /// Open (and migrate) the database at `path`.
    pub fn open(path: impl AsRef<Path>, config: KernelConfig) -> Result<Self> {
        let store = SqliteStore::open_with(path, &config.store)?;
        Ok(Self::new(store, config))
    }

    /// A kernel over a fresh in-memory database.
    pub fn open_memory(config: KernelConfig) -> Result<Self> {
        Ok(Self::new(SqliteStore::open_memory()?, config))
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit event for an action with no domain write (e.g. a
    /// login).
    pub async fn record_audit(&self, event: NewAuditEvent) -> Result<AuditEvent> {
        validate_audit_event(&event)?;
        Ok(self.store.append_audit_event(event).await?)
    }

    /// Run `write`, then append the action's audit event and sync event, all
    /// in one transaction. If any step fails nothing is committed.
    pub async fn commit_action<F, T>(&self, action: ActionRecord, write: F) -> Result<Committed<T>>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        action.validate()?;

        let committed = self
            .store
            .transaction(move |tx| -> Result<Committed<T>> {
                let value = write(tx.connection()).map_err(KernelError::Domain)?;
                let audit_event = tx.append_audit_event(action.audit_event())?;
                let cursor = tx.append_sync_event(action.sync_event())?;
                Ok(Committed {
                    value,
                    audit_event,
                    cursor,
                })
            })
            .await?;

        tracing::debug!(
            audit_event_id = committed.audit_event.id,
            cursor = %committed.cursor,
            "committed action"
        );
        Ok(committed)
    }

    /// Apply a correction unless its base is stale.
    ///
    /// Reading the current entry, comparing and writing happen in one
    /// transaction. A stale base writes a [`ConflictArtifact`] (plus its audit
    /// and sync events) and leaves the domain untouched.
    pub async fn submit_correction<W: CorrectionWriter>(
        &self,
        writer: Arc<W>,
        request: CorrectionRequest,
    ) -> Result<CorrectionOutcome> {
        request.validate()?;

        let outcome = self
            .store
            .transaction(move |tx| -> Result<CorrectionOutcome> {
                let current = writer
                    .current_entry_id(tx.connection(), &request.experiment_id)
                    .map_err(KernelError::Domain)?;

                match check_base(request.base_entry_id.as_deref(), current.as_deref()) {
                    BaseCheck::Current => apply_correction(tx, writer.as_ref(), &request),
                    BaseCheck::Stale {
                        client_base_entry_id,
                        server_latest_entry_id,
                    } => record_conflict(tx, request, client_base_entry_id, server_latest_entry_id),
                }
            })
            .await?;

        match &outcome {
            CorrectionOutcome::Applied { entry_id, cursor, .. } => {
                tracing::debug!(%entry_id, %cursor, "correction applied")
            }
            CorrectionOutcome::Conflict(artifact) => tracing::info!(
                conflict_artifact_id = %artifact.conflict_artifact_id,
                experiment_id = %artifact.experiment_id,
                "correction rejected: stale base"
            ),
        }
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify the whole audit chain.
    pub async fn verify_chain(&self) -> Result<ChainVerification> {
        Ok(self.store.verify_audit_chain().await?)
    }

    /// Audit events after `after_id`, oldest first. At most
    /// [`MAX_AUDIT_PAGE`](labledger_store::audit::MAX_AUDIT_PAGE) are returned
    /// per call.
    pub async fn audit_log(&self, after_id: i64, limit: usize) -> Result<Vec<AuditEvent>> {
        Ok(self.store.list_audit_events(after_id, limit).await?)
    }

    /// One page of sync events for `user_id` after `cursor`.
    pub async fn pull(&self, user_id: &str, cursor: Cursor, limit: Option<usize>) -> Result<SyncPage> {
        Ok(self.store.pull_sync_events(user_id, cursor, limit).await?)
    }

    /// Conflict artifacts for `owner_user_id`.
    pub async fn conflicts(
        &self,
        owner_user_id: &str,
        experiment_id: Option<&str>,
    ) -> Result<Vec<ConflictArtifact>> {
        Ok(self
            .store
            .list_conflict_artifacts(owner_user_id, experiment_id)
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a push stream for one connected client.
    pub fn open_stream<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        user_id: &str,
        cursor: Cursor,
    ) -> Result<SyncStream<SqliteStore, T>> {
        Ok(SyncStream::new(
            Arc::clone(&self.store),
            transport,
            user_id,
            cursor,
            self.config.stream.clone(),
        )?)
    }

    /// Open a push stream and run it on its own task.
    pub fn spawn_stream<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        user_id: &str,
        cursor: Cursor,
    ) -> Result<StreamHandle> {
        let mut stream = self.open_stream(transport, user_id, cursor)?;
        let (cancel, shutdown) = watch::channel(false);
        let join = tokio::spawn(async move { stream.run(shutdown).await });
        Ok(StreamHandle { cancel, join })
    }
}

fn apply_correction<W: CorrectionWriter + ?Sized>(
    tx: &StoreTx<'_>,
    writer: &W,
    request: &CorrectionRequest,
) -> Result<CorrectionOutcome> {
    let entry_id = writer
        .apply(tx.connection(), request)
        .map_err(KernelError::Domain)?;

    let action = ActionRecord {
        owner_user_id: request.owner_user_id.clone(),
        actor_user_id: request.actor_user_id.clone(),
        device_id: request.device_id.clone(),
        event_type: request.action_type.clone(),
        entity_type: "experiment".into(),
        entity_id: Some(request.experiment_id.clone()),
        payload: json!({
            "entryId": entry_id,
            "baseEntryId": request.base_entry_id,
            "payload": request.payload,
        }),
    };
    let audit_event = tx.append_audit_event(action.audit_event())?;
    let cursor = tx.append_sync_event(action.sync_event())?;

    Ok(CorrectionOutcome::Applied {
        entry_id,
        cursor,
        audit_event_id: audit_event.id,
    })
}

fn record_conflict(
    tx: &StoreTx<'_>,
    request: CorrectionRequest,
    client_base_entry_id: Option<String>,
    server_latest_entry_id: Option<String>,
) -> Result<CorrectionOutcome> {
    let artifact = tx.insert_conflict_artifact(NewConflictArtifact {
        owner_user_id: request.owner_user_id,
        actor_user_id: request.actor_user_id,
        device_id: request.device_id,
        experiment_id: request.experiment_id,
        action_type: request.action_type,
        client_base_entry_id,
        server_latest_entry_id,
        payload: request.payload,
    })?;

    let announced = serde_json::to_value(&artifact)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let action = ActionRecord {
        owner_user_id: artifact.owner_user_id.clone(),
        actor_user_id: artifact.actor_user_id.clone(),
        device_id: artifact.device_id.clone(),
        event_type: CONFLICT_DETECTED.into(),
        entity_type: CONFLICT_ARTIFACT.into(),
        entity_id: Some(artifact.conflict_artifact_id.clone()),
        payload: json!({
            "experimentId": artifact.experiment_id,
            "actionType": artifact.action_type,
            "clientBaseEntryId": artifact.client_base_entry_id,
            "serverLatestEntryId": artifact.server_latest_entry_id,
        }),
    };
    tx.append_audit_event(action.audit_event())?;
    tx.append_sync_event(NewSyncEvent {
        event_type: CONFLICT_CREATED.into(),
        payload: announced,
        ..action.sync_event()
    })?;

    Ok(CorrectionOutcome::Conflict(artifact))
}
