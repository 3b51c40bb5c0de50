//! Stale-write detection and conflict artifacts.
//!
//! A correction names the entry it believes is current (its base). If the
//! server's current entry differs, the correction is not applied; a
//! [`ConflictArtifact`] records both ids and the submitted payload instead.
//! There is no automatic merge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Timestamp;

/// Outcome of comparing a client's base against the server's current entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseCheck {
    /// The base is the current entry; the write may proceed.
    Current,
    /// The base is stale.
    Stale {
        client_base_entry_id: Option<String>,
        server_latest_entry_id: Option<String>,
    },
}

impl BaseCheck {
    pub fn is_current(&self) -> bool {
        matches!(self, BaseCheck::Current)
    }
}

/// Compare the client's declared base with the server's current entry.
///
/// Equal ids (including both absent) are current. Any difference is stale,
/// including an absent base against a present entry and the reverse. Empty
/// strings count as absent.
pub fn check_base(client_base: Option<&str>, server_current: Option<&str>) -> BaseCheck {
    let client = client_base.filter(|s| !s.is_empty());
    let server = server_current.filter(|s| !s.is_empty());

    if client == server {
        BaseCheck::Current
    } else {
        BaseCheck::Stale {
            client_base_entry_id: client.map(str::to_owned),
            server_latest_entry_id: server.map(str::to_owned),
        }
    }
}

/// A conflict artifact before storage assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflictArtifact {
    pub owner_user_id: String,
    pub actor_user_id: Option<String>,
    pub device_id: Option<String>,
    pub experiment_id: String,
    pub action_type: String,
    pub client_base_entry_id: Option<String>,
    pub server_latest_entry_id: Option<String>,
    pub payload: Value,
}

/// Immutable evidence that a stale write was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictArtifact {
    pub conflict_artifact_id: String,
    pub owner_user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub experiment_id: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_base_entry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_latest_entry_id: Option<String>,
    pub payload: Value,
    pub created_at: Timestamp,
}
