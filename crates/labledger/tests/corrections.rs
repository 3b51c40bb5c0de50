//! Corrections against a base entry: applied when current, conflict
//! artifact when stale.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use labledger::core::validation::MAX_TAG_LEN;
use labledger::core::{ConflictArtifact, ValidationError};
use labledger::{
    Connection, CorrectionOutcome, CorrectionRequest, CorrectionWriter, Cursor, KernelError,
    CONFLICT_ARTIFACT, CONFLICT_CREATED, CONFLICT_DETECTED,
};
use labledger_testkit::{TableEntries, TestLedger};
use serde_json::json;

fn addendum(base: Option<&str>) -> CorrectionRequest {
    CorrectionRequest {
        owner_user_id: "u1".into(),
        actor_user_id: None,
        device_id: Some("tablet".into()),
        experiment_id: "x1".into(),
        action_type: "entry.addendum".into(),
        base_entry_id: base.map(str::to_owned),
        payload: json!({"text": "pH was 7.5, not 7.4"}),
    }
}

#[tokio::test]
async fn current_base_applies_the_correction() {
    common::init_tracing();
    let ledger = TestLedger::new();
    let base = ledger.seed_entry("u1", "x1", "pH 7.4").await;

    let outcome = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), addendum(Some(&base)))
        .await
        .unwrap();

    let CorrectionOutcome::Applied { entry_id, cursor, audit_event_id } = outcome else {
        panic!("expected the correction to apply");
    };
    assert_ne!(entry_id, base);
    assert_eq!(cursor, Cursor(2));
    assert_eq!(ledger.entry_count("x1"), 2);
    assert!(ledger.kernel().conflicts("u1", None).await.unwrap().is_empty());

    let audit = ledger.kernel().audit_log(audit_event_id - 1, 1).await.unwrap();
    assert_eq!(audit[0].event_type, "entry.addendum");
    assert_eq!(audit[0].entity_id.as_deref(), Some("x1"));
    assert_eq!(audit[0].payload["entryId"], json!(entry_id));
    assert_eq!(audit[0].payload["baseEntryId"], json!(base));
}

#[tokio::test]
async fn stale_base_produces_exactly_one_artifact() {
    let ledger = TestLedger::new();
    let first = ledger.seed_entry("u1", "x1", "pH 7.4").await;
    let latest = ledger.seed_entry("u1", "x1", "pH 7.4 (rerun)").await;

    let outcome = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), addendum(Some(&first)))
        .await
        .unwrap();
    assert!(outcome.is_conflict());

    // Domain unchanged.
    assert_eq!(ledger.entry_count("x1"), 2);

    let artifacts = ledger.kernel().conflicts("u1", Some("x1")).await.unwrap();
    assert_eq!(artifacts.len(), 1);
    let artifact = &artifacts[0];
    assert_eq!(artifact.client_base_entry_id.as_deref(), Some(first.as_str()));
    assert_eq!(artifact.server_latest_entry_id.as_deref(), Some(latest.as_str()));
    assert_eq!(artifact.action_type, "entry.addendum");
    assert_eq!(artifact.device_id.as_deref(), Some("tablet"));
    assert_eq!(artifact.payload, addendum(None).payload);
    assert_eq!(outcome, CorrectionOutcome::Conflict(artifact.clone()));
}

#[tokio::test]
async fn missing_base_against_existing_entry_is_stale() {
    let ledger = TestLedger::new();
    ledger.seed_entry("u1", "x1", "pH 7.4").await;

    let outcome = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), addendum(None))
        .await
        .unwrap();

    let CorrectionOutcome::Conflict(artifact) = outcome else {
        panic!("expected a conflict");
    };
    assert!(artifact.client_base_entry_id.is_none());
    assert!(artifact.server_latest_entry_id.is_some());
}

#[tokio::test]
async fn first_entry_with_no_base_applies() {
    let ledger = TestLedger::new();

    let outcome = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), addendum(None))
        .await
        .unwrap();

    assert!(!outcome.is_conflict());
    assert_eq!(ledger.entry_count("x1"), 1);
}

#[tokio::test]
async fn conflict_is_audited_and_announced() {
    let ledger = TestLedger::new();
    let first = ledger.seed_entry("u1", "x1", "a").await;
    ledger.seed_entry("u1", "x1", "b").await;

    let outcome = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), addendum(Some(&first)))
        .await
        .unwrap();
    let CorrectionOutcome::Conflict(artifact) = outcome else {
        panic!("expected a conflict");
    };

    let audit = ledger.kernel().audit_log(0, 10).await.unwrap();
    let detected = audit.last().unwrap();
    assert_eq!(detected.event_type, CONFLICT_DETECTED);
    assert_eq!(detected.entity_type, CONFLICT_ARTIFACT);
    assert_eq!(
        detected.entity_id.as_deref(),
        Some(artifact.conflict_artifact_id.as_str())
    );

    let page = ledger.kernel().pull("u1", Cursor(2), None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    let announced = &page.events[0];
    assert_eq!(announced.event_type, CONFLICT_CREATED);
    assert_eq!(announced.aggregate_type, CONFLICT_ARTIFACT);
    let decoded: ConflictArtifact = serde_json::from_value(announced.payload.clone()).unwrap();
    assert_eq!(decoded, artifact);

    assert!(ledger.kernel().verify_chain().await.unwrap().valid);
}

#[tokio::test]
async fn conflicts_are_scoped_to_owner_and_experiment() {
    let ledger = TestLedger::new();
    let stale = ledger.seed_entry("u1", "x1", "a").await;
    ledger.seed_entry("u1", "x1", "b").await;
    let kernel = ledger.kernel();

    kernel
        .submit_correction(Arc::new(TableEntries), addendum(Some(&stale)))
        .await
        .unwrap();

    assert_eq!(kernel.conflicts("u1", None).await.unwrap().len(), 1);
    assert!(kernel.conflicts("u1", Some("x2")).await.unwrap().is_empty());
    assert!(kernel.conflicts("u2", None).await.unwrap().is_empty());
}

struct BrokenWriter;

impl CorrectionWriter for BrokenWriter {
    fn current_entry_id(
        &self,
        conn: &Connection,
        experiment_id: &str,
    ) -> anyhow::Result<Option<String>> {
        TableEntries.current_entry_id(conn, experiment_id)
    }

    fn apply(&self, conn: &Connection, request: &CorrectionRequest) -> anyhow::Result<String> {
        TableEntries.apply(conn, request)?;
        anyhow::bail!("entries table is read-only today")
    }
}

#[tokio::test]
async fn failed_domain_write_commits_nothing() {
    let ledger = TestLedger::new();
    let base = ledger.seed_entry("u1", "x1", "a").await;

    let err = ledger
        .kernel()
        .submit_correction(Arc::new(BrokenWriter), addendum(Some(&base)))
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Domain(_)), "{err}");
    assert!(err.to_string().contains("read-only"));

    assert_eq!(ledger.entry_count("x1"), 1);
    assert_eq!(ledger.row_count("audit_events"), 1);
    assert_eq!(ledger.row_count("sync_events"), 1);
    assert_eq!(ledger.row_count("conflict_artifacts"), 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_storage() {
    let ledger = TestLedger::new();
    let mut request = addendum(None);
    request.action_type = String::new();

    let err = ledger
        .kernel()
        .submit_correction(Arc::new(TableEntries), request)
        .await
        .unwrap_err();
    assert!(matches!(err, KernelError::Validation(_)));
    assert_eq!(ledger.row_count("audit_events"), 0);
}

/// Records whether the kernel ever reached the domain.
#[derive(Default)]
struct WatchedWriter {
    calls: AtomicUsize,
}

impl CorrectionWriter for WatchedWriter {
    fn current_entry_id(
        &self,
        conn: &Connection,
        experiment_id: &str,
    ) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TableEntries.current_entry_id(conn, experiment_id)
    }

    fn apply(&self, conn: &Connection, request: &CorrectionRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        TableEntries.apply(conn, request)
    }
}

#[tokio::test]
async fn oversized_fields_never_reach_the_writer() {
    let ledger = TestLedger::new();
    let base = ledger.seed_entry("u1", "x1", "a").await;
    let writer = Arc::new(WatchedWriter::default());
    let long = "t".repeat(MAX_TAG_LEN + 1);

    let mut long_action = addendum(Some(&base));
    long_action.action_type = long.clone();
    let mut long_device = addendum(Some(&base));
    long_device.device_id = Some(long.clone());
    let mut long_actor = addendum(Some(&base));
    long_actor.actor_user_id = Some(long);

    for request in [long_action, long_device, long_actor] {
        let err = ledger
            .kernel()
            .submit_correction(Arc::clone(&writer), request)
            .await
            .unwrap_err();
        assert!(
            matches!(err, KernelError::Validation(ValidationError::FieldTooLong { .. })),
            "{err}"
        );
    }

    assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(ledger.entry_count("x1"), 1);
    assert_eq!(ledger.row_count("audit_events"), 1);
    assert_eq!(ledger.row_count("sync_events"), 1);
    assert_eq!(ledger.row_count("conflict_artifacts"), 0);
}
