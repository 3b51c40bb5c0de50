//! # Labledger Core
//!
//! Pure primitives for the Labledger integrity core: the hash-chained audit
//! ledger, the cursor-ordered sync event log, and stale-write conflict
//! artifacts.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the records the storage layer persists.
//!
//! ## Key Types
//!
//! - [`AuditEvent`] - One link of the tamper-evident audit chain
//! - [`EventHash`] - SHA-256 digest binding an event to its predecessor
//! - [`SyncEvent`] - One entry of the per-owner sync log, addressed by [`Cursor`]
//! - [`ConflictArtifact`] - Durable evidence that a stale write was rejected
//! - [`ChainVerifier`] - Incremental, single-pass chain verification
//!
//! ## Canonicalization
//!
//! Payloads are hashed in canonical JSON form. See [`canonical`] module.

pub mod audit;
pub mod canonical;
pub mod conflict;
pub mod error;
pub mod hash;
pub mod sync_event;
pub mod types;
pub mod validation;

pub use audit::{AuditEvent, BreakReason, ChainBreak, ChainVerification, ChainVerifier, NewAuditEvent};
pub use canonical::{canonical_json, canonicalize_str};
pub use conflict::{check_base, BaseCheck, ConflictArtifact, NewConflictArtifact};
pub use error::{CoreError, ValidationError};
pub use hash::{AuditHashInput, EventHash, AUDIT_HASH_DOMAIN};
pub use sync_event::{
    clamp_pull_limit, NewSyncEvent, SyncEvent, SyncPage, DEFAULT_PULL_LIMIT, MAX_PULL_LIMIT,
};
pub use types::{Cursor, Timestamp};
pub use validation::{validate_audit_event, validate_conflict_artifact, validate_sync_event};
