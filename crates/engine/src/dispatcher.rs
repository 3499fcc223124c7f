// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Dispatcher: moves pending messages to consumers.
//!
//! For each queue with pending messages and at least one attached consumer the
//! dispatcher takes the head message (which assigns its delivery tag), selects
//! the next consumer (round robin) and hands the message over under the
//! delivery timeout. A failed or timed-out delivery is negatively acknowledged with
//! requeue; the next attempt selects a consumer again rather than retrying the
//! one that failed.
//!
//! A pass visits every mailbox and dispatches at most `dispatch_batch_size`
//! messages from each, so one busy queue cannot starve the others. Between
//! passes that delivered nothing the run loop waits for a wake-up (publish,
//! requeue or consumer attach) or the idle poll interval, whichever comes
//! first.

use crate::channel::SessionId;
use crate::clients::ClientRegistry;
use crate::error::{DeliveryError, Error};
use crate::exchange::ExchangeDictionary;
use crate::queue::{DeliveryTag, MessageQueue};
use memorymq_config::BrokerPolicies;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one dispatch attempt on one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message was handed to a consumer and is now in flight.
    Delivered {
        /// Tag of the delivery.
        delivery_tag: DeliveryTag,
        /// Consumer that took it.
        session_id: SessionId,
    },
    /// Nothing is pending.
    EmptyQueue,
    /// Messages are pending but no consumer is attached.
    NoConsumerAvailable,
    /// The consumer did not take the message; it was requeued.
    DeliveryFailed {
        /// Tag of the failed delivery, no longer valid.
        delivery_tag: DeliveryTag,
        /// Consumer that failed.
        session_id: SessionId,
        /// Why the delivery failed.
        error: DeliveryError,
    },
}

/// Counters for one pass over all mailboxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages handed to consumers.
    pub delivered: usize,
    /// Deliveries that failed and were requeued.
    pub failed: usize,
    /// Queues with pending messages but no consumer.
    pub without_consumer: usize,
}

/// Coordinates the exchange and the client registry.
#[derive(Clone)]
pub struct Dispatcher {
    exchange: Arc<ExchangeDictionary>,
    clients: Arc<ClientRegistry>,
    wake: Arc<Notify>,
    delivery_timeout: Duration,
    idle_poll_interval: Duration,
    batch_size: usize,
}

impl Dispatcher {
    /// Creates a dispatcher over `exchange` and `clients`.
    ///
    /// `wake` is notified by whoever makes new work available.
    #[must_use]
    pub fn new(
        exchange: Arc<ExchangeDictionary>,
        clients: Arc<ClientRegistry>,
        wake: Arc<Notify>,
        policies: &BrokerPolicies,
    ) -> Self {
        Self {
            exchange,
            clients,
            wake,
            delivery_timeout: policies.delivery_timeout(),
            idle_poll_interval: policies.idle_poll_interval(),
            batch_size: policies.dispatch_batch_size.max(1),
        }
    }

    /// Attempts to deliver the head message of `queue`.
    pub async fn dispatch_one(&self, queue: &MessageQueue) -> DispatchOutcome {
        if queue.pending_count() == 0 {
            return DispatchOutcome::EmptyQueue;
        }
        let routing_slip = queue.routing_slip();
        let queue_name = routing_slip.queue_name();
        if self.clients.consumer_count(&queue_name) == 0 {
            return DispatchOutcome::NoConsumerAvailable;
        }
        // Take the message before selecting, so a consumer's turn is only
        // spent on an actual delivery.
        let Some(delivery) = queue.mark_delivered() else {
            return DispatchOutcome::EmptyQueue;
        };
        let Some(consumer) = self.clients.try_get_consumer(&queue_name) else {
            if let Err(error) = queue.release(delivery.delivery_tag) {
                warn!(error = %error, "returning undelivered message failed");
            }
            return DispatchOutcome::NoConsumerAvailable;
        };

        let delivery_tag = delivery.delivery_tag;
        let session_id = consumer.session_id().clone();
        let result = match tokio::time::timeout(self.delivery_timeout, consumer.deliver(delivery))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout)),
        };

        match result {
            Ok(()) => {
                debug!(
                    routing_slip = %routing_slip,
                    delivery_tag,
                    session_id = %session_id,
                    "delivered message"
                );
                DispatchOutcome::Delivered {
                    delivery_tag,
                    session_id,
                }
            }
            Err(error) => {
                warn!(
                    routing_slip = %routing_slip,
                    delivery_tag,
                    session_id = %session_id,
                    error = %error,
                    "delivery failed, requeueing"
                );
                match queue.negatively_acknowledge(delivery_tag, true) {
                    Ok(()) => {}
                    // The consumer settled the delivery before its transport reported failure.
                    Err(Error::UnknownDeliveryTag { .. }) => {
                        debug!(delivery_tag, "delivery already settled by consumer");
                    }
                    Err(other) => warn!(error = %other, "requeue after failed delivery failed"),
                }
                DispatchOutcome::DeliveryFailed {
                    delivery_tag,
                    session_id,
                    error,
                }
            }
        }
    }

    /// Runs one pass over every mailbox.
    pub async fn dispatch_pass(&self) -> DispatchReport {
        self.pass(&CancellationToken::new()).await
    }

    async fn pass(&self, shutdown: &CancellationToken) -> DispatchReport {
        let mut report = DispatchReport::default();
        for mailbox in self.exchange.mailboxes() {
            for _ in 0..self.batch_size {
                if shutdown.is_cancelled() {
                    return report;
                }
                match self.dispatch_one(mailbox.queue()).await {
                    DispatchOutcome::Delivered { .. } => report.delivered += 1,
                    DispatchOutcome::DeliveryFailed { .. } => {
                        report.failed += 1;
                        break;
                    }
                    DispatchOutcome::NoConsumerAvailable => {
                        report.without_consumer += 1;
                        break;
                    }
                    DispatchOutcome::EmptyQueue => break,
                }
            }
        }
        report
    }

    /// Dispatches until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!("dispatcher started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let report = self.pass(&shutdown).await;
            if report.delivered > 0 {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep(self.idle_poll_interval) => {}
            }
        }
        info!("dispatcher stopped");
    }

    /// Spawns [`run`](Self::run) on the current Tokio runtime.
    #[must_use]
    pub fn spawn(self) -> DispatcherHandle {
        let shutdown = CancellationToken::new();
        let join = tokio::spawn(self.run(shutdown.clone()));
        DispatcherHandle { shutdown, join }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("delivery_timeout", &self.delivery_timeout)
            .field("idle_poll_interval", &self.idle_poll_interval)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Handle to a spawned dispatcher task.
#[derive(Debug)]
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops the dispatcher and waits for the task to finish.
    ///
    /// A delivery already in progress runs to completion (bounded by the
    /// delivery timeout) so its message is either in flight or requeued.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(error) = self.join.await {
            warn!(error = %error, "dispatcher task failed");
        }
    }
}
