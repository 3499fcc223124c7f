// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Exchange dictionary: the routing table binding routing slips to queues.
//!
//! Queues are created on the first publish or bind for a slip and live for
//! the rest of the process, so every slip maps to exactly one
//! [`MessageQueue`]. Lookups take a read lock; creation takes the write lock
//! and goes through `entry`, making get-or-create atomic. The map lock is
//! released before any queue lock is taken, so operations on different queues
//! never serialize on each other beyond the map lookup.

use crate::error::{Error, Result};
use crate::queue::{DeliveryTag, MessageQueue};
use crate::routing_slip::RoutingSlip;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Routing table from [`RoutingSlip`] to [`MessageQueue`].
#[derive(Default)]
pub struct ExchangeDictionary {
    queues: RwLock<HashMap<RoutingSlip, Arc<MessageQueue>>>,
    max_pending: Option<usize>,
}

impl ExchangeDictionary {
    /// Creates an empty exchange with unbounded queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty exchange whose queues reject publishes beyond
    /// `max_pending` pending messages.
    #[must_use]
    pub fn with_max_pending(max_pending: Option<usize>) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            max_pending,
        }
    }

    /// Returns the queue for `routing_slip`, creating it if needed.
    pub fn bind(&self, routing_slip: &RoutingSlip) -> Arc<MessageQueue> {
        if let Some(queue) = self.queues.read().get(routing_slip) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write();
        let queue = queues.entry(routing_slip.clone()).or_insert_with(|| {
            debug!(routing_slip = %routing_slip, "creating queue");
            Arc::new(MessageQueue::new(routing_slip.clone(), self.max_pending))
        });
        Arc::clone(queue)
    }

    /// Publishes `body` to the queue bound to `routing_slip`.
    pub fn publish(&self, routing_slip: &RoutingSlip, body: impl Into<Bytes>) -> Result<()> {
        debug!(routing_slip = %routing_slip, "publishing message");
        self.bind(routing_slip).enqueue(body.into())
    }

    /// Acknowledges `delivery_tag` on the queue bound to `routing_slip`.
    pub fn acknowledge(&self, delivery_tag: DeliveryTag, routing_slip: &RoutingSlip) -> Result<()> {
        self.existing(routing_slip)?.acknowledge(delivery_tag)
    }

    /// Negatively acknowledges `delivery_tag` on the queue bound to
    /// `routing_slip`, requeueing the message when `requeue` is set.
    pub fn negatively_acknowledge(
        &self,
        delivery_tag: DeliveryTag,
        routing_slip: &RoutingSlip,
        requeue: bool,
    ) -> Result<()> {
        self.existing(routing_slip)?
            .negatively_acknowledge(delivery_tag, requeue)
    }

    /// Returns the queue bound to `routing_slip` without creating it.
    #[must_use]
    pub fn queue(&self, routing_slip: &RoutingSlip) -> Option<Arc<MessageQueue>> {
        self.queues.read().get(routing_slip).map(Arc::clone)
    }

    /// Point-in-time snapshot of every queue, ordered by routing slip.
    #[must_use]
    pub fn mailboxes(&self) -> Vec<Mailbox> {
        let mut mailboxes: Vec<Mailbox> = self
            .queues
            .read()
            .iter()
            .map(|(routing_slip, queue)| Mailbox {
                routing_slip: routing_slip.clone(),
                queue: Arc::clone(queue),
            })
            .collect();
        mailboxes.sort_by(|a, b| a.routing_slip.cmp(&b.routing_slip));
        mailboxes
    }

    /// `true` when every queue is empty (or no queue exists).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let queues: Vec<Arc<MessageQueue>> = self.queues.read().values().map(Arc::clone).collect();
        queues.iter().all(|queue| queue.is_empty())
    }

    fn existing(&self, routing_slip: &RoutingSlip) -> Result<Arc<MessageQueue>> {
        self.queue(routing_slip)
            .ok_or_else(|| Error::UnknownRoutingSlip {
                routing_slip: routing_slip.clone(),
            })
    }
}

impl std::fmt::Debug for ExchangeDictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeDictionary")
            .field("queues", &self.queues.read().len())
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

/// Read-only view pairing a routing slip with its queue, for monitoring.
#[derive(Clone)]
pub struct Mailbox {
    routing_slip: RoutingSlip,
    queue: Arc<MessageQueue>,
}

impl Mailbox {
    /// Routing slip of the queue.
    #[must_use]
    pub fn routing_slip(&self) -> &RoutingSlip {
        &self.routing_slip
    }

    /// Messages waiting for delivery.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Delivered, unsettled messages.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.queue.in_flight_count()
    }

    /// Whether the queue has nothing pending and nothing in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Age of the oldest pending message.
    #[must_use]
    pub fn oldest_pending_age(&self) -> Option<Duration> {
        self.queue.oldest_pending_age()
    }

    pub(crate) fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }
}

impl std::fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("routing_slip", &self.routing_slip)
            .field("pending", &self.pending_count())
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slip(exchange: &str, routing_key: &str) -> RoutingSlip {
        RoutingSlip::parse(exchange, routing_key).expect("valid slip")
    }

    #[test]
    fn publish_creates_exactly_one_queue_per_slip() {
        let exchange = ExchangeDictionary::new();
        exchange.publish(&slip("ex", "a"), "1").expect("publish");
        exchange.publish(&slip("ex", "a"), "2").expect("publish");
        exchange.publish(&slip("ex", "b"), "3").expect("publish");

        let mailboxes = exchange.mailboxes();
        assert_eq!(mailboxes.len(), 2);
        assert_eq!(mailboxes[0].routing_slip(), &slip("ex", "a"));
        assert_eq!(mailboxes[0].pending_count(), 2);
        assert_eq!(mailboxes[1].pending_count(), 1);

        let first = exchange.bind(&slip("ex", "a"));
        let second = exchange.bind(&slip("ex", "a"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn bind_creates_an_empty_queue() {
        let exchange = ExchangeDictionary::new();
        _ = exchange.bind(&slip("ex", "a"));
        assert!(exchange.is_empty());
        assert_eq!(exchange.mailboxes().len(), 1);
        assert!(exchange.queue(&slip("ex", "b")).is_none());
    }

    #[test]
    fn settling_on_unknown_slip_fails() {
        let exchange = ExchangeDictionary::new();
        let err = exchange
            .acknowledge(1, &slip("ex", "missing"))
            .expect_err("unknown slip");
        assert_eq!(
            err,
            Error::UnknownRoutingSlip {
                routing_slip: slip("ex", "missing")
            }
        );
        assert!(
            exchange
                .negatively_acknowledge(1, &slip("ex", "missing"), true)
                .is_err()
        );
    }

    #[test]
    fn mailboxes_are_a_snapshot() {
        let exchange = ExchangeDictionary::new();
        exchange.publish(&slip("ex", "a"), "1").expect("publish");
        let snapshot = exchange.mailboxes();
        exchange.publish(&slip("ex", "b"), "2").expect("publish");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(exchange.mailboxes().len(), 2);
    }

    // Concurrent first publishes to one slip must not race on queue creation.
    #[test]
    fn concurrent_get_or_create_yields_one_queue() {
        let exchange = Arc::new(ExchangeDictionary::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let exchange = Arc::clone(&exchange);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        exchange.publish(&slip("ex", "hot"), "x").expect("publish");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("publisher panicked");
        }
        let mailboxes = exchange.mailboxes();
        assert_eq!(mailboxes.len(), 1);
        assert_eq!(mailboxes[0].pending_count(), 800);
    }
}
