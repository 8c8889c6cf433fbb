use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;
use std::time::Duration;

use agentflow_agents::AgentRegistry;
use agentflow_auth::{InMemoryUsageStore, QuotaService};
use agentflow_core::{JobId, OrganizationId, UserId};
use agentflow_infra::jobs::{JobDescriptor, JobOwner};
use agentflow_infra::{InMemoryContextStore, InMemoryJobQueue, JobQueue, Worker, WorkerConfig};
use serde_json::json;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn descriptor(owner: JobOwner) -> JobDescriptor {
    JobDescriptor::new(JobId::new(), "Echo", json!({"msg": "bench"}), owner)
}

fn owner() -> JobOwner {
    JobOwner {
        user_id: UserId::new(),
        organization_id: OrganizationId::new(),
        project_id: None,
    }
}

/// Enqueue latency on an ever-growing queue.
fn bench_enqueue(c: &mut Criterion) {
    let rt = runtime();
    let queue = InMemoryJobQueue::new();
    let owner = owner();

    c.bench_function("in_memory_enqueue", |b| {
        b.to_async(&rt).iter(|| async {
            queue.enqueue(black_box(&descriptor(owner))).await.unwrap();
        })
    });
}

/// Full enqueue → receive → delete round for different batch sizes.
fn bench_receive_delete(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("in_memory_receive_delete");

    for batch in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &batch| {
            let queue = InMemoryJobQueue::new();
            let owner = owner();
            b.to_async(&rt).iter(|| async {
                for _ in 0..batch {
                    queue.enqueue(&descriptor(owner)).await.unwrap();
                }
                let received = queue
                    .receive_batch(batch, Duration::from_secs(60), Duration::ZERO)
                    .await
                    .unwrap();
                for message in &received {
                    queue.delete(&message.receipt).await.unwrap();
                }
                black_box(received.len())
            })
        });
    }

    group.finish();
}

/// One Echo job through the worker's message path.
fn bench_worker_echo(c: &mut Criterion) {
    let rt = runtime();
    let queue = Arc::new(InMemoryJobQueue::new());
    let contexts = Arc::new(InMemoryContextStore::new());
    let worker = Worker::new(
        queue.clone(),
        contexts,
        AgentRegistry::with_builtins(),
        QuotaService::new(Arc::new(InMemoryUsageStore::new())),
        WorkerConfig::default(),
    );
    let owner = owner();

    c.bench_function("worker_process_echo", |b| {
        b.to_async(&rt).iter(|| async {
            queue.enqueue(&descriptor(owner)).await.unwrap();
            let mut batch = queue
                .receive_batch(1, Duration::from_secs(60), Duration::ZERO)
                .await
                .unwrap();
            if let Some(message) = batch.pop() {
                black_box(worker.process_message(message).await);
            }
        })
    });
}

criterion_group!(benches, bench_enqueue, bench_receive_delete, bench_worker_echo);
criterion_main!(benches);
