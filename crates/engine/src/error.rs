// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

use crate::queue::DeliveryTag;
use crate::routing_slip::RoutingSlip;
use std::time::Duration;

/// Errors produced by broker operations.
///
/// These are caller errors (protocol mismatches or duplicate settlements) and
/// are never retried by the broker. Transient conditions such as an empty
/// queue or a queue without consumers are reported as values instead.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Ack/nack referenced a routing slip for which no queue was ever created.
    #[error("no queue exists for routing slip `{routing_slip}`")]
    UnknownRoutingSlip {
        /// The unrecognized routing slip.
        routing_slip: RoutingSlip,
    },
    /// Ack/nack referenced a delivery tag that is not in flight.
    #[error("delivery tag {delivery_tag} is not in flight on `{routing_slip}`")]
    UnknownDeliveryTag {
        /// Routing slip of the queue that was asked.
        routing_slip: RoutingSlip,
        /// The unknown, already settled, or forged tag.
        delivery_tag: DeliveryTag,
    },
    /// Publish rejected because the queue reached its pending capacity.
    #[error("queue `{routing_slip}` is full ({capacity} pending messages)")]
    QueueFull {
        /// Routing slip of the full queue.
        routing_slip: RoutingSlip,
        /// Configured pending capacity.
        capacity: usize,
    },
    /// Broker configuration failed validation.
    #[error("invalid broker configuration: {reason}")]
    InvalidConfiguration {
        /// Validation error details.
        reason: String,
    },
}

/// Failure to hand a delivery to a consumer over its transport channel.
///
/// Always answered by the dispatcher with a requeue.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The consumer did not accept the delivery in time.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    /// The consumer channel is closed.
    #[error("consumer channel closed")]
    ChannelClosed,
    /// Any other transport-side failure.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;
