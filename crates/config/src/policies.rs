// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Broker policies and the declarative broker specification.

use crate::error::ConfigError;
use crate::names::{ExchangeName, RoutingKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Policies applied by the broker to every queue and delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BrokerPolicies {
    /// Maximum number of pending messages per queue. `None` means unbounded.
    ///
    /// When reached, publishing to that queue is rejected. Requeued messages
    /// are always accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending_per_queue: Option<usize>,
    /// Upper bound for one delivery to a consumer, in milliseconds.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Longest time the dispatcher sleeps without a wake-up, in milliseconds.
    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,
    /// Messages dispatched from one queue before moving to the next one.
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
}

impl Default for BrokerPolicies {
    fn default() -> Self {
        Self {
            max_pending_per_queue: None,
            delivery_timeout_ms: default_delivery_timeout_ms(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            dispatch_batch_size: default_dispatch_batch_size(),
        }
    }
}

impl BrokerPolicies {
    /// Delivery timeout as a [`Duration`].
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Idle poll interval as a [`Duration`].
    #[must_use]
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    /// Returns validation errors for this policy set.
    #[must_use]
    pub fn validation_errors(&self, path_prefix: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_pending_per_queue == Some(0) {
            errors.push(format!(
                "{path_prefix}.max_pending_per_queue must be greater than 0 when set"
            ));
        }
        if self.delivery_timeout_ms == 0 {
            errors.push(format!(
                "{path_prefix}.delivery_timeout_ms must be greater than 0"
            ));
        }
        if self.idle_poll_interval_ms == 0 {
            errors.push(format!(
                "{path_prefix}.idle_poll_interval_ms must be greater than 0"
            ));
        }
        if self.dispatch_batch_size == 0 {
            errors.push(format!(
                "{path_prefix}.dispatch_batch_size must be greater than 0"
            ));
        }
        errors
    }
}

/// A queue binding declared up front: the queue for this routing slip exists
/// as soon as the broker is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct BindingSpec {
    /// Exchange the queue is bound to.
    pub exchange: ExchangeName,
    /// Routing key the queue is bound with.
    pub routing_key: RoutingKey,
}

/// Declarative broker specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BrokerSpec {
    /// Broker behavior policies.
    #[serde(default)]
    pub policies: BrokerPolicies,
    /// Queues created at startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingSpec>,
}

impl BrokerSpec {
    /// Parses and validates a YAML broker specification.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Reads, parses and validates a YAML broker specification file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Returns validation errors for this specification.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = self.policies.validation_errors("policies");
        for (i, binding) in self.bindings.iter().enumerate() {
            let duplicate = self.bindings[..i].iter().any(|prior| prior == binding);
            if duplicate {
                errors.push(format!(
                    "bindings[{i}] duplicates binding `{}`/`{}`",
                    binding.exchange, binding.routing_key
                ));
            }
        }
        errors
    }

    /// Fails with [`ConfigError::Validation`] if any constraint is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { errors })
        }
    }
}

const fn default_delivery_timeout_ms() -> u64 {
    30_000
}

const fn default_idle_poll_interval_ms() -> u64 {
    100
}

const fn default_dispatch_batch_size() -> usize {
    64
}
