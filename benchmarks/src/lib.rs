// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the MemoryMq benchmarks.

use bytes::Bytes;
use memorymq_engine::RoutingSlip;

/// Message body sizes exercised by every benchmark.
pub const MSG_SIZES: [usize; 3] = [32, 256, 4096];

/// A body of `size` bytes.
#[must_use]
pub fn make_payload(size: usize) -> Bytes {
    Bytes::from(vec![42u8; size])
}

/// `count` distinct routing slips on the `bench` exchange.
#[must_use]
pub fn routing_slips(count: usize) -> Vec<RoutingSlip> {
    (0..count)
        .map(|i| {
            RoutingSlip::parse("bench", &format!("key-{i}")).expect("generated names are non-empty")
        })
        .collect()
}
