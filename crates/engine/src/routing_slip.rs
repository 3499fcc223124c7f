// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

use memorymq_config::{BindingSpec, ExchangeName, QueueName, RoutingKey};

/// The (exchange, routing key) pair a message is published under and a queue
/// is bound to.
///
/// Immutable and cheap to clone; equality and hashing cover both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingSlip {
    exchange: ExchangeName,
    routing_key: RoutingKey,
}

impl RoutingSlip {
    /// Creates a routing slip from validated names.
    #[must_use]
    pub fn new(exchange: ExchangeName, routing_key: RoutingKey) -> Self {
        Self {
            exchange,
            routing_key,
        }
    }

    /// Parses both names and creates a routing slip.
    pub fn parse(exchange: &str, routing_key: &str) -> Result<Self, String> {
        Ok(Self::new(
            ExchangeName::parse(exchange)?,
            RoutingKey::parse(routing_key)?,
        ))
    }

    /// Exchange name.
    #[must_use]
    pub fn exchange(&self) -> &ExchangeName {
        &self.exchange
    }

    /// Routing key.
    #[must_use]
    pub fn routing_key(&self) -> &RoutingKey {
        &self.routing_key
    }

    /// Name of the consumer queue that serves this slip.
    #[must_use]
    pub fn queue_name(&self) -> QueueName {
        QueueName::for_binding(&self.exchange, &self.routing_key)
    }
}

impl std::fmt::Display for RoutingSlip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.routing_key)
    }
}

impl From<&BindingSpec> for RoutingSlip {
    fn from(binding: &BindingSpec) -> Self {
        Self::new(binding.exchange.clone(), binding.routing_key.clone())
    }
}
