// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Criterion benchmarks for the exchange hot path: publish, take for delivery
//! and acknowledge, without any consumer transport in between.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use memorymq_benchmarks::{MSG_SIZES, make_payload, routing_slips};
use memorymq_engine::ExchangeDictionary;

const MSG_COUNT: u64 = 10_000;
const THREAD_COUNTS: [usize; 4] = [1, 2, 4, 8];

fn run_exchange_cycle(msg_size: usize) {
    let exchange = ExchangeDictionary::new();
    let slip = routing_slips(1).remove(0);
    let queue = exchange.bind(&slip);
    let payload = make_payload(msg_size);

    for _ in 0..MSG_COUNT {
        exchange
            .publish(&slip, payload.clone())
            .expect("benchmark publish failed");
    }
    while let Some(delivery) = queue.mark_delivered() {
        _ = black_box(&delivery.body);
        exchange
            .acknowledge(delivery.delivery_tag, &slip)
            .expect("benchmark ack failed");
    }
    assert!(exchange.is_empty());
}

fn run_flume_cycle(msg_size: usize) {
    let (tx, rx) = flume::unbounded();
    let payload = make_payload(msg_size);
    for _ in 0..MSG_COUNT {
        tx.send(payload.clone()).expect("flume send failed");
    }
    drop(tx);
    while let Ok(msg) = rx.recv() {
        _ = black_box(&msg);
    }
}

/// Single-threaded publish/deliver/ack cycle compared with a plain flume queue.
fn bench_exchange_cycle(c: &mut Criterion) {
    for &msg_size in &MSG_SIZES {
        let mut group = c.benchmark_group(format!("exchange_cycle/{}B", msg_size));
        _ = group.throughput(Throughput::Elements(MSG_COUNT));
        _ = group.bench_function("exchange", |b| b.iter(|| run_exchange_cycle(msg_size)));
        _ = group.bench_function("flume", |b| b.iter(|| run_flume_cycle(msg_size)));
        group.finish();
    }
}

/// Concurrent publishers, either all on one slip or each on its own slip.
fn bench_publish_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_contention");
    _ = group.throughput(Throughput::Elements(MSG_COUNT));

    for &threads in &THREAD_COUNTS {
        for (label, distinct) in [("shared_slip", false), ("slip_per_thread", true)] {
            _ = group.bench_with_input(BenchmarkId::new(label, threads), &threads, |b, &threads| {
                b.iter(|| {
                    let exchange = Arc::new(ExchangeDictionary::new());
                    let slips = routing_slips(threads);
                    let per_thread = MSG_COUNT / threads as u64;
                    std::thread::scope(|scope| {
                        for i in 0..threads {
                            let exchange = Arc::clone(&exchange);
                            let slip = if distinct { &slips[i] } else { &slips[0] };
                            _ = scope.spawn(move || {
                                let payload = make_payload(32);
                                for _ in 0..per_thread {
                                    exchange
                                        .publish(slip, payload.clone())
                                        .expect("benchmark publish failed");
                                }
                            });
                        }
                    });
                    _ = black_box(exchange.mailboxes().len());
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_exchange_cycle, bench_publish_contention);
criterion_main!(benches);
