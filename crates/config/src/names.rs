// Copyright The MemoryMq Authors
// SPDX-License-Identifier: Apache-2.0

//! Validated names used to address exchanges, routing keys and consumer queues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            #[doc = concat!("Parses and validates a ", $what, ".")]
            pub fn parse(raw: &str) -> Result<Self, String> {
                if raw.trim().is_empty() {
                    return Err(concat!($what, " must be non-empty").to_owned());
                }
                Ok(Self(Arc::from(raw)))
            }

            #[doc = concat!("Returns the ", $what, " as a string slice.")]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value.as_str())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.as_ref().to_owned()
            }
        }
    };
}

validated_name!(
    /// Name of an exchange, the namespace messages are published under.
    ExchangeName,
    "exchange name"
);

validated_name!(
    /// Routing key that, paired with an exchange, selects a queue.
    RoutingKey,
    "routing key"
);

validated_name!(
    /// Name of a logical consumer queue in the client registry.
    QueueName,
    "queue name"
);

impl QueueName {
    /// Consumer queue name serving the `exchange`/`routing_key` binding.
    ///
    /// Formatted as `exchange:routing_key` with `\` and `:` escaped by a
    /// backslash inside each part, so distinct bindings never share a name.
    #[must_use]
    pub fn for_binding(exchange: &ExchangeName, routing_key: &RoutingKey) -> Self {
        let mut name =
            String::with_capacity(exchange.as_str().len() + routing_key.as_str().len() + 1);
        push_escaped(&mut name, exchange.as_str());
        name.push(':');
        push_escaped(&mut name, routing_key.as_str());
        Self(Arc::from(name))
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == '\\' || c == ':' {
            out.push('\\');
        }
        out.push(c);
    }
}
