//! SHA-256 hashing for the audit chain.
//!
//! An event's hash commits to its own fields and to the hash of the event
//! before it, so editing any stored event breaks every link after it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::canonical_json;
use crate::error::CoreError;
use crate::types::Timestamp;

/// Domain separation prefix for audit event hashes.
pub const AUDIT_HASH_DOMAIN: &[u8] = b"labledger/audit-event/v1";

/// A 32-byte SHA-256 digest of an audit event.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHash(pub [u8; 32]);

impl EventHash {
    /// Compute the SHA-256 hash of raw data.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CoreError::InvalidHash(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for EventHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for EventHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for EventHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EventHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The fields an audit event's hash commits to, in hashing order.
#[derive(Debug, Clone, Copy)]
pub struct AuditHashInput<'a> {
    pub created_at: Timestamp,
    pub actor_id: Option<&'a str>,
    pub event_type: &'a str,
    pub entity_type: &'a str,
    pub entity_id: Option<&'a str>,
    pub payload: &'a Value,
    pub prev_hash: Option<&'a EventHash>,
}

impl AuditHashInput<'_> {
    /// The exact byte string fed to SHA-256.
    ///
    /// Format: domain || for each field: u64 big-endian length || bytes.
    /// Absent optional fields are encoded as empty strings.
    pub fn preimage(&self) -> Vec<u8> {
        let created_at = self.created_at.to_canonical_string();
        let payload = canonical_json(self.payload);
        let prev_hash = self.prev_hash.map(EventHash::to_hex).unwrap_or_default();

        let fields: [&[u8]; 7] = [
            created_at.as_bytes(),
            self.actor_id.unwrap_or("").as_bytes(),
            self.event_type.as_bytes(),
            self.entity_type.as_bytes(),
            self.entity_id.unwrap_or("").as_bytes(),
            payload.as_bytes(),
            prev_hash.as_bytes(),
        ];

        let total: usize = fields.iter().map(|f| 8 + f.len()).sum();
        let mut buf = Vec::with_capacity(AUDIT_HASH_DOMAIN.len() + total);
        buf.extend_from_slice(AUDIT_HASH_DOMAIN);
        for field in fields {
            buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
            buf.extend_from_slice(field);
        }
        buf
    }

    /// Compute the event hash.
    pub fn compute(&self) -> EventHash {
        EventHash::digest(&self.preimage())
    }
}
