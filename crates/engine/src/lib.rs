// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! In-process message broker core.
//!
//! Producers publish opaque bodies under a [`RoutingSlip`] (exchange plus
//! routing key). The [`ExchangeDictionary`] keeps one [`MessageQueue`] per
//! slip. Consumers attach to a queue through the [`ClientRegistry`], which
//! hands them deliveries in round-robin order. The [`Dispatcher`] moves
//! pending messages to consumers, and consumers settle each delivery by tag
//! with an acknowledgement or a negative acknowledgement (optionally
//! requeueing it).
//!
//! [`MemoryMq`] wires these parts together.
//!
//! ```no_run
//! use memorymq_engine::{MemoryMq, RoutingSlip, local_consumer};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryMq::default();
//! let slip = RoutingSlip::parse("orders", "created")?;
//! let (consumer, receiver) = local_consumer("session-1");
//! _ = broker.add_consumer(&slip, consumer);
//! let dispatcher = broker.spawn_dispatcher();
//!
//! broker.publish(&slip, "hello")?;
//! if let Some(delivery) = receiver.recv().await {
//!     broker.ack(&delivery)?;
//! }
//! dispatcher.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod broker;
mod channel;
mod clients;
mod dispatcher;
mod error;
mod exchange;
mod local;
mod queue;
mod routing_slip;
mod wrapper;


pub use broker::MemoryMq;
pub use channel::{ClosedHook, ConsumerChannel, Delivery, SessionId};
pub use clients::ClientRegistry;
pub use dispatcher::{DispatchOutcome, DispatchReport, Dispatcher, DispatcherHandle};
pub use error::{DeliveryError, Error, Result};
pub use exchange::{ExchangeDictionary, Mailbox};
pub use local::{LocalConsumer, LocalConsumerReceiver, local_consumer};
pub use memorymq_config::{
    BindingSpec, BrokerPolicies, BrokerSpec, ConfigError, ExchangeName, QueueName, RoutingKey,
};
pub use queue::{DeliveryTag, MessageQueue};
pub use routing_slip::RoutingSlip;
pub use wrapper::{ConsumerWrapper, MessageHandler};
