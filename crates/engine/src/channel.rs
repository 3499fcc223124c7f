// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! The consumer transport boundary.
//!
//! The broker reaches a consumer only through [`ConsumerChannel`]: a stable
//! session identifier, a `deliver` call and a closed notification. How these
//! travel over the wire is the transport's business. [`crate::LocalConsumer`]
//! is the in-process implementation.

use crate::error::DeliveryError;
use crate::queue::DeliveryTag;
use crate::routing_slip::RoutingSlip;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Identifier of one consumer connection, stable for the life of that
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Arc<str>);

impl SessionId {
    /// Creates a session identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// A message handed to a consumer.
///
/// Carries everything the consumer needs to settle it: the delivery tag and
/// the routing slip of the queue it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Per-queue tag identifying this delivery.
    pub delivery_tag: DeliveryTag,
    /// Routing slip of the source queue.
    pub routing_slip: RoutingSlip,
    /// `true` when this message was delivered before and got requeued.
    pub redelivered: bool,
    /// Opaque message body.
    pub body: Bytes,
}

/// Callback run once when a consumer channel closes.
pub type ClosedHook = Box<dyn FnOnce() + Send + 'static>;

/// A connected consumer as seen by the broker.
#[async_trait]
pub trait ConsumerChannel: Send + Sync + 'static {
    /// Session identifier of this connection.
    fn session_id(&self) -> &SessionId;

    /// Hands a delivery to the remote consumer.
    ///
    /// Returning `Ok` means the consumer took the delivery; it still has to
    /// acknowledge or negatively acknowledge it through the broker.
    async fn deliver(&self, delivery: Delivery) -> Result<(), DeliveryError>;

    /// Registers a hook to run when the channel closes.
    ///
    /// If the channel is already closed the hook runs immediately. Hooks may
    /// run on any thread.
    fn on_closed(&self, hook: ClosedHook);
}
