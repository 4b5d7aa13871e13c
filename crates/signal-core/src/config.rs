//! Relay configuration
//!
//! Built once at start-up and handed to the relay by value.

use std::time::Duration;

use bytes::Bytes;
use signal_types::{BindingSpec, Error, ExchangeKind, Result};

/// Everything the relay loop needs to know about its topology and behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Exchange the queue is bound to and republished messages go to
    pub exchange: String,

    /// Kind used when `declare_exchange` is set
    pub exchange_kind: ExchangeKind,

    /// Declare the exchange instead of assuming it exists
    pub declare_exchange: bool,

    /// Queue to provision and consume from
    pub queue: String,

    /// Routing key for both the binding and republishing
    pub routing_key: String,

    /// Consumer identity passed to the subscription
    pub consumer_tag: String,

    /// Stop after this long; `None` runs until signalled
    pub lifetime: Option<Duration>,

    /// Body to publish after each relayed message; `None` disables republishing
    pub republish: Option<Bytes>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            exchange: "signal-exchange".to_string(),
            exchange_kind: ExchangeKind::Direct,
            declare_exchange: false,
            queue: "signal-queue".to_string(),
            routing_key: "signal-key".to_string(),
            consumer_tag: "signal-consumer".to_string(),
            lifetime: None,
            republish: None,
        }
    }
}

impl RelayConfig {
    /// The binding the relay provisions
    pub fn binding(&self) -> BindingSpec {
        BindingSpec::new(&self.exchange, &self.routing_key, &self.queue)
    }

    /// Reject configurations the relay cannot provision.
    ///
    /// An empty routing key is valid: it binds and publishes with `""`.
    pub fn validate(&self) -> Result<()> {
        if self.queue.is_empty() {
            return Err(Error::InvalidConfig("queue name must not be empty".into()));
        }
        if self.exchange.is_empty() {
            return Err(Error::InvalidConfig(
                "exchange name must not be empty (the default exchange cannot be bound)".into(),
            ));
        }
        Ok(())
    }
}
