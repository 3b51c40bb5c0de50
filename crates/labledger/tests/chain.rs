//! Audit chain verification against a real database file.

mod common;

use labledger::core::NewAuditEvent;
use labledger::{BreakReason, Kernel, KernelConfig};
use labledger_testkit::TestLedger;
use serde_json::json;

async fn record(kernel: &Kernel, event_type: &str, n: u32) -> i64 {
    kernel
        .record_audit(
            NewAuditEvent::new(event_type, "entry")
                .actor("u1")
                .entity_id(format!("e{n}"))
                .payload(json!({"n": n})),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn empty_chain_is_valid() {
    let kernel = Kernel::open_memory(KernelConfig::default()).unwrap();
    let verification = kernel.verify_chain().await.unwrap();

    assert!(verification.valid);
    assert_eq!(verification.checked_events, 0);
    assert!(verification.chain_break().is_none());
}

#[tokio::test]
async fn two_events_then_corrupting_the_second() {
    common::init_tracing();
    let ledger = TestLedger::new();
    let a = record(ledger.kernel(), "entry.create", 1).await;
    let b = record(ledger.kernel(), "entry.create", 2).await;

    let verification = ledger.kernel().verify_chain().await.unwrap();
    assert!(verification.valid);
    assert_eq!(verification.checked_events, 2);

    ledger.tamper_audit_column(b, "payload", r#"{"n":3}"#);

    let verification = ledger.kernel().verify_chain().await.unwrap();
    assert!(!verification.valid);
    assert_eq!(verification.checked_events, 1);
    assert_eq!(verification.broken_at_event_id, Some(b));
    assert_eq!(verification.reason, Some(BreakReason::EventHashMismatch));
    assert_ne!(a, b);
}

#[tokio::test]
async fn events_link_to_their_predecessor() {
    let ledger = TestLedger::new();
    for n in 0..5 {
        record(ledger.kernel(), "entry.create", n).await;
    }

    let events = ledger.kernel().audit_log(0, 100).await.unwrap();
    assert_eq!(events.len(), 5);
    assert!(events[0].prev_hash.is_none());
    for pair in events.windows(2) {
        assert_eq!(pair[1].prev_hash, Some(pair[0].event_hash));
        assert!(pair[0].id < pair[1].id);
    }
}

#[tokio::test]
async fn rewritten_prev_hash_is_a_prev_mismatch() {
    let ledger = TestLedger::new();
    for n in 0..3 {
        record(ledger.kernel(), "entry.create", n).await;
    }
    let events = ledger.kernel().audit_log(0, 10).await.unwrap();

    // Point the second event at the third; still well-formed hex.
    ledger.tamper_audit_column(events[1].id, "prev_hash", &events[2].event_hash.to_hex());

    let verification = ledger.kernel().verify_chain().await.unwrap();
    assert_eq!(verification.broken_at_event_id, Some(events[1].id));
    assert_eq!(verification.reason, Some(BreakReason::PrevHashMismatch));
    assert_eq!(verification.checked_events, 1);
}

#[tokio::test]
async fn deleted_event_breaks_its_successor() {
    let ledger = TestLedger::new();
    for n in 0..4 {
        record(ledger.kernel(), "entry.create", n).await;
    }
    let events = ledger.kernel().audit_log(0, 10).await.unwrap();

    ledger.delete_audit_event(events[1].id);

    let verification = ledger.kernel().verify_chain().await.unwrap();
    assert_eq!(verification.broken_at_event_id, Some(events[2].id));
    assert_eq!(verification.reason, Some(BreakReason::PrevHashMismatch));
}

#[tokio::test]
async fn shifted_timestamp_is_detected() {
    let ledger = TestLedger::new();
    for n in 0..3 {
        record(ledger.kernel(), "entry.create", n).await;
    }

    ledger.tamper_audit_timestamp(1);

    let verification = ledger.kernel().verify_chain().await.unwrap();
    assert_eq!(verification.broken_at_event_id, Some(1));
    assert_eq!(verification.reason, Some(BreakReason::EventHashMismatch));
    assert_eq!(verification.checked_events, 0);
}

#[tokio::test]
async fn rewritten_actor_is_detected_by_another_process() {
    let ledger = TestLedger::new();
    for n in 0..3 {
        record(ledger.kernel(), "entry.create", n).await;
    }
    ledger.tamper_audit_column(3, "actor_id", "mallory");

    let other = ledger.reopen();
    let verification = other.verify_chain().await.unwrap();
    assert_eq!(verification.broken_at_event_id, Some(3));
    assert_eq!(verification.checked_events, 2);
}

#[tokio::test]
async fn stored_rows_cannot_be_updated_through_sql() {
    let ledger = TestLedger::new();
    record(ledger.kernel(), "entry.create", 1).await;

    let conn = ledger.raw();
    assert!(conn
        .execute("UPDATE audit_events SET actor_id = 'mallory'", [])
        .is_err());
    assert!(conn.execute("DELETE FROM audit_events", []).is_err());
    assert!(ledger.kernel().verify_chain().await.unwrap().valid);
}

#[tokio::test]
async fn verification_serializes_in_wire_shape() {
    let ledger = TestLedger::new();
    record(ledger.kernel(), "entry.create", 1).await;
    ledger.corrupt_event_hash(1);

    let verification = ledger.kernel().verify_chain().await.unwrap();
    let value = serde_json::to_value(&verification).unwrap();
    assert_eq!(
        value,
        json!({
            "valid": false,
            "checkedEvents": 0,
            "brokenAtEventId": 1,
            "reason": "event_hash checksum mismatch",
        })
    );
}
