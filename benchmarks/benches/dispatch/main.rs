// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Criterion benchmarks for end-to-end delivery through the dispatcher to
//! round-robin local consumers that acknowledge every message.

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use memorymq_benchmarks::{MSG_SIZES, make_payload, routing_slips};
use memorymq_engine::{MemoryMq, local_consumer};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

const MSG_COUNT: u64 = 5_000;
const CONSUMER_COUNTS: [usize; 4] = [1, 2, 4, 8];

#[derive(Clone, Copy)]
struct BenchCase {
    msg_size: usize,
    num_consumers: usize,
}

async fn run_dispatch_case(case: BenchCase) {
    let broker = MemoryMq::default();
    let slip = routing_slips(1).remove(0);
    let received = Arc::new(AtomicU64::new(0));
    let done = Arc::new(Notify::new());

    // Attach consumers.
    let mut consumers = Vec::new();
    let mut consumer_tasks = Vec::new();
    for i in 0..case.num_consumers {
        let (consumer, receiver) = local_consumer(format!("bench-{i}"));
        _ = broker.add_consumer(&slip, consumer.clone());
        consumers.push(consumer);

        let broker = broker.clone();
        let received = Arc::clone(&received);
        let done = Arc::clone(&done);
        consumer_tasks.push(tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                _ = black_box(&delivery.body);
                broker.ack(&delivery).expect("benchmark ack failed");
                if received.fetch_add(1, Ordering::Relaxed) + 1 == MSG_COUNT {
                    done.notify_one();
                }
            }
        }));
    }
    let dispatcher = broker.spawn_dispatcher();

    // Publish.
    let payload = make_payload(case.msg_size);
    for _ in 0..MSG_COUNT {
        broker
            .publish(&slip, payload.clone())
            .expect("benchmark publish failed");
    }

    // Wait for consumers, then tear down.
    done.notified().await;
    for consumer in &consumers {
        consumer.close();
    }
    for task in consumer_tasks {
        task.await.expect("consumer task panicked");
    }
    dispatcher.shutdown().await;
    assert!(broker.is_empty());
}

/// Dispatch throughput by message size and consumer count.
fn bench_dispatch(c: &mut Criterion) {
    for &msg_size in &MSG_SIZES {
        let mut group = c.benchmark_group(format!("dispatch/{}B", msg_size));
        _ = group.throughput(Throughput::Elements(MSG_COUNT));

        for &num_consumers in &CONSUMER_COUNTS {
            let case = BenchCase {
                msg_size,
                num_consumers,
            };
            _ = group.bench_with_input(
                BenchmarkId::new("round_robin", num_consumers),
                &case,
                |b, case| {
                    let rt = Runtime::new().expect("tokio runtime creation failed");
                    b.to_async(&rt).iter(|| run_dispatch_case(*case));
                },
            );
        }

        group.finish();
    }
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
