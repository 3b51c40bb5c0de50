//! # Labledger Testkit
//!
//! Testing utilities for Labledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Audit events with known canonical payloads and hashes
//! - **Generators**: Proptest strategies for JSON payloads, events and actions
//! - **Fixtures**: A file-backed ledger with helpers for seeding and tampering
//!
//! ## Golden Vectors
//!
//! Any implementation sharing a ledger must agree on these hashes:
//!
//! ```rust
//! use labledger_testkit::vectors::{all_vectors, compute_vector_hash};
//!
//! for vector in all_vectors() {
//!     assert_eq!(compute_vector_hash(&vector).to_hex(), vector.expected_hash);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use labledger_testkit::generators::{action_from_params, ActionParams};
//!
//! proptest! {
//!     #[test]
//!     fn actions_validate(params: ActionParams) {
//!         let action = action_from_params(&params);
//!         prop_assert!(!action.event_type.is_empty());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use labledger_testkit::fixtures::TestLedger;
//!
//! let ledger = TestLedger::new();
//! let entry_id = ledger.seed_entry("u1", "x1", "pH 7.4").await;
//! ledger.tamper_audit_column(1, "payload", "{}");
//! assert!(!ledger.kernel().verify_chain().await?.valid);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TableEntries, TestLedger};
pub use generators::{action_from_params, ActionParams};
pub use vectors::{all_vectors, compute_vector_hash, verify_all_vectors, GoldenVector};
