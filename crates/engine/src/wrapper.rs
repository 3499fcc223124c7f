// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Consumer-side helper settling deliveries from a handler's result.

use crate::broker::MemoryMq;
use crate::channel::Delivery;
use crate::local::LocalConsumerReceiver;
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, warn};

/// Application logic invoked once per delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Error reported when a message could not be processed.
    type Error: Display + Send;

    /// Processes one delivery.
    async fn handle(&self, delivery: &Delivery) -> Result<(), Self::Error>;
}

/// Runs a [`MessageHandler`] for every delivery of a local consumer.
///
/// Each delivery is handled on its own task. `Ok` acknowledges the delivery;
/// `Err` or a panic in the handler negatively acknowledges it with requeue.
pub struct ConsumerWrapper<H> {
    broker: MemoryMq,
    handler: Arc<H>,
}

impl<H: MessageHandler> ConsumerWrapper<H> {
    /// Wraps `handler`, settling deliveries through `broker`.
    pub fn new(broker: MemoryMq, handler: H) -> Self {
        Self {
            broker,
            handler: Arc::new(handler),
        }
    }

    /// Consumes until the channel closes, then waits for in-progress handlers.
    pub async fn run(self, receiver: LocalConsumerReceiver) {
        let mut tasks = JoinSet::new();
        while let Some(delivery) = receiver.recv().await {
            let broker = self.broker.clone();
            let handler = Arc::clone(&self.handler);
            _ = tasks.spawn(execute(broker, handler, delivery));
            // Reap finished tasks so the set does not grow unbounded.
            while let Some(result) = tasks.try_join_next() {
                log_join_error(result);
            }
        }
        while let Some(result) = tasks.join_next().await {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: Result<(), JoinError>) {
    if let Err(error) = result {
        warn!(error = %error, "consumer wrapper task failed");
    }
}

/// Runs the handler on its own task so a panic surfaces as a [`JoinError`]
/// instead of leaving the delivery unsettled.
async fn execute<H: MessageHandler>(broker: MemoryMq, handler: Arc<H>, delivery: Delivery) {
    let handled = {
        let delivery = delivery.clone();
        tokio::spawn(async move {
            handler
                .handle(&delivery)
                .await
                .map_err(|error| error.to_string())
        })
        .await
    };

    let failure = match handled {
        Ok(Ok(())) => {
            if let Err(error) = broker.ack(&delivery) {
                warn!(
                    routing_slip = %delivery.routing_slip,
                    delivery_tag = delivery.delivery_tag,
                    error = %error,
                    "acknowledge after successful handling failed"
                );
            }
            return;
        }
        Ok(Err(handler_error)) => handler_error,
        Err(join_error) if join_error.is_panic() => "message handler panicked".to_owned(),
        Err(join_error) => join_error.to_string(),
    };

    error!(
        routing_slip = %delivery.routing_slip,
        delivery_tag = delivery.delivery_tag,
        error = %failure,
        "message handler failed, requeueing"
    );
    if let Err(error) = broker.nack(&delivery, true) {
        warn!(
            routing_slip = %delivery.routing_slip,
            delivery_tag = delivery.delivery_tag,
            error = %error,
            "negative acknowledge after failed handling failed"
        );
    }
}

impl<H> std::fmt::Debug for ConsumerWrapper<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerWrapper")
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
