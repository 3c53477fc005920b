//! Event dispatch and offline queue benchmarks.
//!
//! Run with: cargo bench --bench event_router
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adw_trigger_client::client::{MessageQueue, QueuedMessage};
use adw_trigger_client::{ConnectionEvent, EventRouter, OutboundMessage, OwnerId, listener};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use tokio::time::Instant;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LISTENER_COUNTS: &[usize] = &[1, 16, 128];
const QUEUE_CAPACITIES: &[usize] = &[100, 1_000];

// ============================================================================
// Benchmark: Emit Fan-out
// ============================================================================

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");

    for &count in LISTENER_COUNTS {
        let router = EventRouter::<ConnectionEvent>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..count {
            let hits = Arc::clone(&hits);
            router.on(
                "status_update",
                listener(move |_: &ConnectionEvent| {
                    hits.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        let event = ConnectionEvent::Message {
            kind: "status_update".to_string(),
            data: json!({ "adw_id": "abc12345", "status": "running" }),
        };

        group.bench_with_input(BenchmarkId::new("listeners", count), &count, |b, _| {
            b.iter(|| black_box(router.emit("status_update", &event)));
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Owner Churn
// ============================================================================

fn bench_owner_churn(c: &mut Criterion) {
    let router = EventRouter::<ConnectionEvent>::new();
    let owner = OwnerId::new("panel");

    c.bench_function("owner_churn", |b| {
        b.iter(|| {
            for event in ["connect", "disconnect", "status_update", "workflow_log"] {
                router.on_owned(owner.clone(), event, listener(|_: &ConnectionEvent| {}));
            }
            black_box(router.off_owner(&owner))
        });
    });
}

// ============================================================================
// Benchmark: Queue Eviction
// ============================================================================

fn bench_queue_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_eviction");

    for &capacity in QUEUE_CAPACITIES {
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            &capacity,
            |b, &capacity| {
                let mut queue = MessageQueue::new(capacity, 3);
                let now = Instant::now();
                let mut n = 0u64;
                b.iter(|| {
                    n += 1;
                    let message = OutboundMessage::custom("note", json!({ "n": n }));
                    black_box(queue.enqueue(QueuedMessage::new(message, now)))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_emit, bench_owner_churn, bench_queue_eviction);
criterion_main!(benches);
