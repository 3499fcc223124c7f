// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration model for the MemoryMq broker: validated names, broker
//! policies and the declarative startup specification.

mod error;
mod names;
mod policies;

pub use error::ConfigError;
pub use names::{ExchangeName, QueueName, RoutingKey};
pub use policies::{BindingSpec, BrokerPolicies, BrokerSpec};
