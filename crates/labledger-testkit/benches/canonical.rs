//! Canonicalization and chain hashing benchmarks.
//!
//! Run with: `cargo bench -p labledger-testkit --bench canonical`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use labledger::core::{canonical_json, AuditEvent, ChainVerifier, NewAuditEvent, Timestamp};
use labledger::{ActionRecord, Kernel, KernelConfig};

fn payload(fields: usize) -> Value {
    let mut map = serde_json::Map::new();
    for i in (0..fields).rev() {
        map.insert(
            format!("field_{i:04}"),
            json!({"reading": i as f64 * 0.25, "unit": "mM", "ok": i % 2 == 0}),
        );
    }
    Value::Object(map)
}

fn chain(len: usize) -> Vec<AuditEvent> {
    let mut events: Vec<AuditEvent> = Vec::with_capacity(len);
    for i in 0..len {
        let prev = events.last().map(|e| e.event_hash);
        events.push(
            NewAuditEvent::new("entry.create", "entry")
                .actor("u1")
                .entity_id(format!("e{i}"))
                .payload(payload(4))
                .seal(
                    i as i64 + 1,
                    format!("evt-{i}"),
                    Timestamp::from_micros(1_700_000_000_000_000 + i as i64),
                    prev,
                ),
        );
    }
    events
}

fn bench_canonical_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_json");
    for fields in [4usize, 64, 512] {
        let value = payload(fields);
        group.throughput(Throughput::Bytes(canonical_json(&value).len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &value, |b, value| {
            b.iter(|| canonical_json(black_box(value)))
        });
    }
    group.finish();
}

fn bench_verify_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_chain");
    for len in [100usize, 1_000] {
        let events = chain(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| {
                let mut verifier = ChainVerifier::new();
                for event in events {
                    verifier.check(black_box(event));
                }
                verifier.finish()
            })
        });
    }
    group.finish();
}

fn bench_commit_action(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let kernel = Kernel::open_memory(KernelConfig::default()).unwrap();

    c.bench_function("commit_action", |b| {
        b.iter(|| {
            let action = ActionRecord::new("u1", "entry.created", "experiment")
                .entity_id("x1")
                .payload(payload(4));
            runtime
                .block_on(kernel.commit_action(action, |_| Ok(())))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_canonical_json, bench_verify_chain, bench_commit_action);
criterion_main!(benches);
