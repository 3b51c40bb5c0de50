//! Audit events and chain verification.
//!
//! The audit ledger is append-only. Each event carries the hash of the event
//! before it (`prev_hash`) and its own hash (`event_hash`), computed over its
//! fields plus `prev_hash`. Only the first event has no `prev_hash`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::{AuditHashInput, EventHash};
use crate::types::Timestamp;

/// A new audit event, before storage assigns its sequence id and hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub actor_id: Option<String>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: Value,
}

impl NewAuditEvent {
    /// Create an event with an empty (`null`) payload and no actor or entity id.
    pub fn new(event_type: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            payload: Value::Null,
        }
    }

    /// Set the acting user.
    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set the entity the event is about.
    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the payload.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Seal the event into a chain link.
    pub fn seal(
        self,
        id: i64,
        event_id: String,
        created_at: Timestamp,
        prev_hash: Option<EventHash>,
    ) -> AuditEvent {
        let mut event = AuditEvent {
            id,
            event_id,
            actor_id: self.actor_id,
            event_type: self.event_type,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            payload: self.payload,
            created_at,
            prev_hash,
            event_hash: EventHash::from_bytes([0u8; 32]),
        };
        event.event_hash = event.compute_hash();
        event
    }
}

/// One stored link of the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Monotonic sequence id assigned by storage.
    pub id: i64,
    /// Globally unique event identifier.
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub event_type: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub payload: Value,
    pub created_at: Timestamp,
    pub prev_hash: Option<EventHash>,
    pub event_hash: EventHash,
}

impl AuditEvent {
    /// The fields this event's hash commits to.
    pub fn hash_input(&self) -> AuditHashInput<'_> {
        AuditHashInput {
            created_at: self.created_at,
            actor_id: self.actor_id.as_deref(),
            event_type: &self.event_type,
            entity_type: &self.entity_type,
            entity_id: self.entity_id.as_deref(),
            payload: &self.payload,
            prev_hash: self.prev_hash.as_ref(),
        }
    }

    /// Recompute the hash from the stored fields.
    pub fn compute_hash(&self) -> EventHash {
        self.hash_input().compute()
    }
}

/// Why verification stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakReason {
    /// `prev_hash` differs from the preceding event's `event_hash`.
    #[serde(rename = "prev_hash mismatch")]
    PrevHashMismatch,
    /// The stored `event_hash` differs from the recomputed one.
    #[serde(rename = "event_hash checksum mismatch")]
    EventHashMismatch,
}

impl BreakReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakReason::PrevHashMismatch => "prev_hash mismatch",
            BreakReason::EventHashMismatch => "event_hash checksum mismatch",
        }
    }
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The first broken link found by verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBreak {
    pub event_id: i64,
    pub reason: BreakReason,
}

/// Result of a full chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    /// Events that passed before verification stopped.
    pub checked_events: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at_event_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BreakReason>,
}

impl ChainVerification {
    /// The break, if any.
    pub fn chain_break(&self) -> Option<ChainBreak> {
        match (self.broken_at_event_id, self.reason) {
            (Some(event_id), Some(reason)) => Some(ChainBreak { event_id, reason }),
            _ => None,
        }
    }
}

/// Single-pass verifier fed events in ascending sequence order.
///
/// Stops accepting input after the first break.
#[derive(Debug, Default)]
pub struct ChainVerifier {
    prev_hash: Option<EventHash>,
    checked: u64,
    broken: Option<ChainBreak>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the next event. Returns `false` once the chain is broken.
    pub fn check(&mut self, event: &AuditEvent) -> bool {
        if self.broken.is_some() {
            return false;
        }

        if event.prev_hash != self.prev_hash {
            return self.record_break(event.id, BreakReason::PrevHashMismatch);
        }

        if event.compute_hash() != event.event_hash {
            return self.record_break(event.id, BreakReason::EventHashMismatch);
        }

        self.prev_hash = Some(event.event_hash);
        self.checked += 1;
        true
    }

    /// Record a break detected outside [`check`](Self::check), e.g. a stored
    /// row that no longer decodes. Always returns `false`.
    pub fn record_break(&mut self, event_id: i64, reason: BreakReason) -> bool {
        if self.broken.is_none() {
            self.broken = Some(ChainBreak { event_id, reason });
        }
        false
    }

    /// Whether a break has been recorded.
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Finish and report.
    pub fn finish(self) -> ChainVerification {
        ChainVerification {
            valid: self.broken.is_none(),
            checked_events: self.checked,
            broken_at_event_id: self.broken.map(|b| b.event_id),
            reason: self.broken.map(|b| b.reason),
        }
    }
}
