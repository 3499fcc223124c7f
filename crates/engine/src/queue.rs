// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-routing-slip message queue.
//!
//! # State
//!
//! A queue holds two structures under one lock:
//!
//! - `pending`: FIFO of envelopes waiting for delivery. Pending envelopes have
//!   no delivery tag yet.
//! - `in_flight`: delivered but unsettled envelopes keyed by delivery tag.
//!
//! Moving an envelope between the two (delivery, requeue) happens inside a
//! single critical section, so a live message is always in exactly one of
//! them.
//!
//! # Delivery tags
//!
//! Tags are issued from a per-queue counter starting at 1 when a message is
//! delivered, not when it is enqueued. Tags are never reused: a requeued
//! message gets a fresh tag on redelivery.
//!
//! # Ordering
//!
//! Pending messages are delivered in enqueue order. A requeued message is
//! appended at the tail and loses its original position.

use crate::channel::Delivery;
use crate::error::{Error, Result};
use crate::routing_slip::RoutingSlip;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Per-queue identifier of one delivery.
pub type DeliveryTag = u64;

struct Envelope {
    body: Bytes,
    enqueued_at: Instant,
    // Number of times this envelope was handed to a consumer.
    deliveries: u32,
}

struct QueueState {
    pending: VecDeque<Envelope>,
    in_flight: HashMap<DeliveryTag, Envelope>,
    next_tag: DeliveryTag,
}

/// An ordered, thread-safe queue of messages for one routing slip.
pub struct MessageQueue {
    routing_slip: RoutingSlip,
    max_pending: Option<usize>,
    state: Mutex<QueueState>,
}

impl MessageQueue {
    /// Creates an empty queue. `max_pending` bounds the pending sequence for
    /// publishes; `None` means unbounded.
    #[must_use]
    pub fn new(routing_slip: RoutingSlip, max_pending: Option<usize>) -> Self {
        Self {
            routing_slip,
            max_pending,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                next_tag: 1,
            }),
        }
    }

    /// Routing slip this queue is bound to.
    #[must_use]
    pub fn routing_slip(&self) -> &RoutingSlip {
        &self.routing_slip
    }

    /// Appends a message at the tail of the pending sequence.
    ///
    /// Fails with [`Error::QueueFull`] only when a pending capacity is
    /// configured and reached.
    pub fn enqueue(&self, body: Bytes) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(capacity) = self.max_pending {
            if state.pending.len() >= capacity {
                return Err(Error::QueueFull {
                    routing_slip: self.routing_slip.clone(),
                    capacity,
                });
            }
        }
        state.pending.push_back(Envelope {
            body,
            enqueued_at: Instant::now(),
            deliveries: 0,
        });
        Ok(())
    }

    /// Pops the head of the pending sequence, assigns it the next delivery tag
    /// and moves it in flight.
    ///
    /// Returns `None` when nothing is pending.
    pub fn mark_delivered(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        let mut envelope = state.pending.pop_front()?;
        let delivery_tag = state.next_tag;
        state.next_tag += 1;

        let redelivered = envelope.deliveries > 0;
        envelope.deliveries = envelope.deliveries.saturating_add(1);
        let body = envelope.body.clone();
        _ = state.in_flight.insert(delivery_tag, envelope);

        Some(Delivery {
            delivery_tag,
            routing_slip: self.routing_slip.clone(),
            redelivered,
            body,
        })
    }

    /// Settles a delivery as processed and drops the message.
    pub fn acknowledge(&self, delivery_tag: DeliveryTag) -> Result<()> {
        let mut state = self.state.lock();
        match state.in_flight.remove(&delivery_tag) {
            Some(_) => Ok(()),
            None => Err(self.unknown_tag(delivery_tag)),
        }
    }

    /// Settles a delivery as rejected.
    ///
    /// With `requeue` the message goes back to the tail of the pending
    /// sequence, bypassing the pending capacity. Without it the message is
    /// discarded.
    pub fn negatively_acknowledge(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<()> {
        let mut state = self.state.lock();
        let Some(envelope) = state.in_flight.remove(&delivery_tag) else {
            return Err(self.unknown_tag(delivery_tag));
        };
        if requeue {
            state.pending.push_back(envelope);
        }
        Ok(())
    }

    /// Puts an in-flight message back at the head of the pending sequence as
    /// if it had never been handed out. Used when no consumer took it.
    pub(crate) fn release(&self, delivery_tag: DeliveryTag) -> Result<()> {
        let mut state = self.state.lock();
        let Some(mut envelope) = state.in_flight.remove(&delivery_tag) else {
            return Err(self.unknown_tag(delivery_tag));
        };
        envelope.deliveries = envelope.deliveries.saturating_sub(1);
        state.pending.push_front(envelope);
        Ok(())
    }

    /// `true` when nothing is pending and nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    /// Number of messages waiting for delivery.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of delivered, unsettled messages.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Time since the message at the head of the pending sequence was first
    /// enqueued.
    #[must_use]
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.state
            .lock()
            .pending
            .front()
            .map(|envelope| envelope.enqueued_at.elapsed())
    }

    fn unknown_tag(&self, delivery_tag: DeliveryTag) -> Error {
        Error::UnknownDeliveryTag {
            routing_slip: self.routing_slip.clone(),
            delivery_tag,
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageQueue")
            .field("routing_slip", &self.routing_slip)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("next_tag", &state.next_tag)
            .finish()
    }
}
