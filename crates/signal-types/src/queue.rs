//! Queue, binding and exchange types
//!
//! These describe broker-owned state as observed by the relay. Nothing here
//! is persisted locally.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Flags used when declaring a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Survive a broker restart
    pub durable: bool,
    /// Delete when the last consumer goes away
    pub auto_delete: bool,
    /// Restrict the queue to the declaring connection
    pub exclusive: bool,
}

impl QueueOptions {
    /// Durable, non-auto-deleted, non-exclusive: the shape the relay provisions.
    pub fn durable() -> Self {
        Self {
            durable: true,
            auto_delete: false,
            exclusive: false,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::durable()
    }
}

/// Snapshot of a queue taken at declare time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    /// Queue name as reported by the broker
    pub name: String,

    /// Whether the queue was declared durable
    pub durable: bool,

    /// Messages ready in the queue at declare time
    pub message_count: u32,

    /// Consumers attached at declare time
    pub consumer_count: u32,
}

/// A rule linking a queue to an exchange through a routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingSpec {
    pub exchange: String,
    pub routing_key: String,
    pub queue_name: String,
}

impl BindingSpec {
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            queue_name: queue_name.into(),
        }
    }

    /// Whether a publish to `exchange` with `routing_key` reaches this binding.
    pub fn matches(&self, exchange: &str, routing_key: &str) -> bool {
        self.exchange == exchange && self.routing_key == routing_key
    }
}

/// Exchange type, as accepted by `--exchange-type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
    /// Plugin-provided exchange type (`x-...`)
    Custom(String),
}

impl ExchangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Custom(name) => name,
        }
    }
}

impl Default for ExchangeKind {
    fn default() -> Self {
        Self::Direct
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            custom if custom.starts_with("x-") && custom.len() > 2 => {
                Ok(ExchangeKind::Custom(custom.to_string()))
            }
            other => Err(Error::InvalidConfig(format!(
                "unknown exchange type '{}' (expected direct|fanout|topic|headers|x-custom)",
                other
            ))),
        }
    }
}
