//! Message types for the signal relay
//!
//! `InboundMessage` is what a subscription yields; `OutboundMessage` is what
//! the publisher hands to a broker link.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broker-side details of a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    /// Channel-scoped delivery tag
    pub delivery_tag: u64,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key the message was published with
    pub routing_key: String,

    /// Whether the broker has delivered this message before
    pub redelivered: bool,

    /// Content type property, if the publisher set one
    pub content_type: Option<String>,

    /// When the relay pulled the delivery off the subscription
    pub received_at: DateTime<Utc>,
}

impl Default for DeliveryMetadata {
    fn default() -> Self {
        Self {
            delivery_tag: 0,
            exchange: String::new(),
            routing_key: String::new(),
            redelivered: false,
            content_type: None,
            received_at: Utc::now(),
        }
    }
}

/// A message delivered to the relay by a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw message body
    pub body: Bytes,

    /// Delivery details
    pub metadata: DeliveryMetadata,
}

impl InboundMessage {
    pub fn new(body: impl Into<Bytes>, metadata: DeliveryMetadata) -> Self {
        Self {
            body: body.into(),
            metadata,
        }
    }

    /// Get the body as a string (if valid UTF-8)
    pub fn body_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Split into body and metadata, moving the body out.
    pub fn into_parts(self) -> (Bytes, DeliveryMetadata) {
        (self.body, self.metadata)
    }
}

/// Persistence requested from the broker for a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Not written to disk by the broker
    Transient,
    /// Written to disk when routed to a durable queue
    Persistent,
}

impl DeliveryMode {
    /// AMQP wire value (1 = non-persistent, 2 = persistent)
    pub fn as_u8(self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }
}

/// A message on its way to an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Bytes,
    pub content_type: String,
    pub delivery_mode: DeliveryMode,
    /// 0-9
    pub priority: u8,
}

impl OutboundMessage {
    /// Transient JSON message at priority 0, the relay's publish shape.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            content_type: "application/json".to_string(),
            delivery_mode: DeliveryMode::Transient,
            priority: 0,
        }
    }

    /// Get the body as a string (if valid UTF-8)
    pub fn body_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
