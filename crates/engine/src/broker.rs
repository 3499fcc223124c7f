// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Broker facade.
//!
//! `MemoryMq` owns one exchange dictionary, one client registry and the
//! dispatcher wake-up signal. It is what a host process wires up: producers
//! publish through it, transports attach consumers through it, consumers
//! settle deliveries through it. Every operation that can create work for the
//! dispatcher (publish, requeue, consumer attach) wakes it.

use crate::channel::{ConsumerChannel, Delivery, SessionId};
use crate::clients::ClientRegistry;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::error::{Error, Result};
use crate::exchange::{ExchangeDictionary, Mailbox};
use crate::queue::DeliveryTag;
use crate::routing_slip::RoutingSlip;
use bytes::Bytes;
use memorymq_config::{BrokerPolicies, BrokerSpec, QueueName};
use std::sync::Arc;
use tokio::sync::Notify;

/// In-process message broker.
///
/// Thread-safe and cheaply cloneable.
#[derive(Clone)]
pub struct MemoryMq {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    exchange: Arc<ExchangeDictionary>,
    clients: Arc<ClientRegistry>,
    wake: Arc<Notify>,
    policies: BrokerPolicies,
}

impl MemoryMq {
    /// Creates a broker with the given policies.
    #[must_use]
    pub fn new(policies: BrokerPolicies) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                exchange: Arc::new(ExchangeDictionary::with_max_pending(
                    policies.max_pending_per_queue,
                )),
                clients: Arc::new(ClientRegistry::new()),
                wake: Arc::new(Notify::new()),
                policies,
            }),
        }
    }

    /// Validates `spec`, creates the broker and binds the declared queues.
    pub fn from_spec(spec: &BrokerSpec) -> Result<Self> {
        spec.validate()
            .map_err(|error| Error::InvalidConfiguration {
                reason: error.to_string(),
            })?;
        let broker = Self::new(spec.policies.clone());
        for binding in &spec.bindings {
            broker.bind(&RoutingSlip::from(binding));
        }
        Ok(broker)
    }

    /// Policies this broker runs with.
    #[must_use]
    pub fn policies(&self) -> &BrokerPolicies {
        &self.inner.policies
    }

    /// Creates the queue for `routing_slip` if it does not exist yet.
    pub fn bind(&self, routing_slip: &RoutingSlip) {
        _ = self.inner.exchange.bind(routing_slip);
    }

    /// Publishes `body` under `routing_slip`.
    pub fn publish(&self, routing_slip: &RoutingSlip, body: impl Into<Bytes>) -> Result<()> {
        self.inner.exchange.publish(routing_slip, body)?;
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Acknowledges a delivery.
    pub fn acknowledge(&self, delivery_tag: DeliveryTag, routing_slip: &RoutingSlip) -> Result<()> {
        self.inner.exchange.acknowledge(delivery_tag, routing_slip)
    }

    /// Negatively acknowledges a delivery, requeueing it when `requeue` is set.
    pub fn negatively_acknowledge(
        &self,
        delivery_tag: DeliveryTag,
        routing_slip: &RoutingSlip,
        requeue: bool,
    ) -> Result<()> {
        self.inner
            .exchange
            .negatively_acknowledge(delivery_tag, routing_slip, requeue)?;
        if requeue {
            self.inner.wake.notify_one();
        }
        Ok(())
    }

    /// Acknowledges `delivery`.
    pub fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.acknowledge(delivery.delivery_tag, &delivery.routing_slip)
    }

    /// Negatively acknowledges `delivery`.
    pub fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        self.negatively_acknowledge(delivery.delivery_tag, &delivery.routing_slip, requeue)
    }

    /// Binds `routing_slip` and attaches `consumer` to its queue.
    ///
    /// Returns the queue name the consumer was registered under.
    pub fn add_consumer(
        &self,
        routing_slip: &RoutingSlip,
        consumer: Arc<dyn ConsumerChannel>,
    ) -> QueueName {
        self.bind(routing_slip);
        let queue_name = routing_slip.queue_name();
        self.inner.clients.add_consumer(&queue_name, consumer);
        self.inner.wake.notify_one();
        queue_name
    }

    /// Detaches the consumer `session_id` from the queue of `routing_slip`.
    pub fn remove_consumer(&self, routing_slip: &RoutingSlip, session_id: &SessionId) -> bool {
        self.inner
            .clients
            .remove_consumer(&routing_slip.queue_name(), session_id)
    }

    /// Number of consumers attached to the queue of `routing_slip`.
    #[must_use]
    pub fn consumer_count(&self, routing_slip: &RoutingSlip) -> usize {
        self.inner
            .clients
            .consumer_count(&routing_slip.queue_name())
    }

    /// Snapshot of every queue.
    #[must_use]
    pub fn mailboxes(&self) -> Vec<Mailbox> {
        self.inner.exchange.mailboxes()
    }

    /// `true` when no message is pending or in flight anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.exchange.is_empty()
    }

    /// The broker's exchange dictionary.
    #[must_use]
    pub fn exchange(&self) -> &Arc<ExchangeDictionary> {
        &self.inner.exchange
    }

    /// The broker's client registry.
    #[must_use]
    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.inner.clients
    }

    /// A dispatcher bound to this broker.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.inner.exchange),
            Arc::clone(&self.inner.clients),
            Arc::clone(&self.inner.wake),
            &self.inner.policies,
        )
    }

    /// Spawns a dispatcher task on the current Tokio runtime.
    #[must_use]
    pub fn spawn_dispatcher(&self) -> DispatcherHandle {
        self.dispatcher().spawn()
    }
}

impl Default for MemoryMq {
    fn default() -> Self {
        Self::new(BrokerPolicies::default())
    }
}

impl std::fmt::Debug for MemoryMq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMq")
            .field("exchange", &self.inner.exchange)
            .field("clients", &self.inner.clients)
            .field("policies", &self.inner.policies)
            .finish()
    }
}
