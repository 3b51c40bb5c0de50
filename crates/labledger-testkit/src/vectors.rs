//! Golden test vectors for the audit chain hash.
//!
//! Any implementation that reads or writes the same ledger must reproduce
//! these hashes byte for byte. The vectors chain: `addendum-with-floats`
//! links to `entry-create`, which links to `login`.

use labledger_core::{canonicalize_str, AuditHashInput, EventHash, Timestamp};
use serde_json::Value;

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Microseconds since the Unix epoch.
    pub created_at_micros: i64,
    pub actor_id: Option<&'static str>,
    pub event_type: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<&'static str>,
    /// Payload as a client would send it (not canonical).
    pub payload_json: &'static str,
    /// Previous event hash (hex), absent for a chain head.
    pub prev_hash: Option<&'static str>,
    /// Canonical JSON of the payload.
    pub expected_canonical_payload: &'static str,
    /// Expected event hash (hex).
    pub expected_hash: &'static str,
}

const LOGIN_HASH: &str = "b733d7783f72bd7ae2bcbb9bd50e5ed3c14b38418938a916558e93808aee1b4f";
const ENTRY_CREATE_HASH: &str = "5b39a5b5d7dd1f31c2d4c8f02276ce3a2e07b3ca717dedad0ac008d09313420c";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "login",
            created_at_micros: 1_700_000_000_000_000, // 2023-11-14T22:13:20Z
            actor_id: Some("u1"),
            event_type: "auth.login",
            entity_type: "user",
            entity_id: Some("u1"),
            payload_json: r#"{"ok":true,"ip":"10.0.0.1"}"#,
            prev_hash: None,
            expected_canonical_payload: r#"{"ip":"10.0.0.1","ok":true}"#,
            expected_hash: LOGIN_HASH,
        },
        GoldenVector {
            name: "entry-create",
            created_at_micros: 1_700_000_000_000_250,
            actor_id: Some("u1"),
            event_type: "entry.create",
            entity_type: "entry",
            entity_id: Some("e1"),
            payload_json: r#"{"text":"pH 7.4","n":1}"#,
            prev_hash: Some(LOGIN_HASH),
            expected_canonical_payload: r#"{"n":1,"text":"pH 7.4"}"#,
            expected_hash: ENTRY_CREATE_HASH,
        },
        GoldenVector {
            name: "system-start-at-epoch",
            created_at_micros: 0,
            actor_id: None,
            event_type: "system.start",
            entity_type: "system",
            entity_id: None,
            payload_json: "null",
            prev_hash: None,
            expected_canonical_payload: "null",
            expected_hash: "251714aa681d4fbe9a81c4252cb5add795440604d1ad001c0fb3a2d2ff95cce4",
        },
        GoldenVector {
            name: "addendum-with-floats",
            created_at_micros: 1_700_000_000_123_456,
            actor_id: Some("u2"),
            event_type: "entry.addendum",
            entity_type: "experiment",
            entity_id: Some("x1"),
            payload_json: r#"{"v":1.0,"a":[1,2.5,-0.0],"z":"café"}"#,
            prev_hash: Some(ENTRY_CREATE_HASH),
            expected_canonical_payload: r#"{"a":[1,2.5,0],"v":1,"z":"café"}"#,
            expected_hash: "93503c3556f410346678ab0ade220600ad273858796423f7c5ef2a6fbf3eae2a",
        },
    ]
}

/// Canonicalize the vector's payload.
pub fn canonical_payload(vector: &GoldenVector) -> String {
    canonicalize_str(vector.payload_json)
        .unwrap_or_else(|e| panic!("vector {} has invalid payload: {e}", vector.name))
}

/// Compute the event hash a vector describes.
pub fn compute_vector_hash(vector: &GoldenVector) -> EventHash {
    let payload: Value = serde_json::from_str(vector.payload_json)
        .unwrap_or_else(|e| panic!("vector {} has invalid payload: {e}", vector.name));
    let prev = vector.prev_hash.map(|hex| {
        EventHash::from_hex(hex)
            .unwrap_or_else(|e| panic!("vector {} has invalid prev hash: {e}", vector.name))
    });

    AuditHashInput {
        created_at: Timestamp::from_micros(vector.created_at_micros),
        actor_id: vector.actor_id,
        event_type: vector.event_type,
        entity_type: vector.entity_type,
        entity_id: vector.entity_id,
        payload: &payload,
        prev_hash: prev.as_ref(),
    }
    .compute()
}

/// Verify all golden vectors.
///
/// Returns `Ok(())` if all match, or a list of mismatches.
pub fn verify_all_vectors() -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    for vector in all_vectors() {
        let canonical = canonical_payload(&vector);
        if canonical != vector.expected_canonical_payload {
            errors.push(format!(
                "{}: canonical payload {} != {}",
                vector.name, canonical, vector.expected_canonical_payload
            ));
        }

        let hash = compute_vector_hash(&vector).to_hex();
        if hash != vector.expected_hash {
            errors.push(format!(
                "{}: hash {} != {}",
                vector.name, hash, vector.expected_hash
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
