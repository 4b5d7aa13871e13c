//! Broker link trait definition
//!
//! Defines the interface the relay uses to talk to a broker. A link is one
//! connection plus one channel; implementations must be safe to call from
//! several tasks at once.

use async_trait::async_trait;
use futures::stream::BoxStream;
use signal_types::{
    BindingSpec, ExchangeKind, InboundMessage, OutboundMessage, QueueDescriptor, QueueOptions,
    Result,
};

/// Lazy, unbounded sequence of deliveries for one subscription.
///
/// Ends when the channel closes or the broker cancels the consumer.
/// Consumers treat a yielded error as the end of the subscription.
pub type DeliveryStream = BoxStream<'static, Result<InboundMessage>>;

/// Broker link trait - all backends implement this
#[async_trait]
pub trait BrokerLink: Send + Sync {
    // ==================== Topology ====================

    /// Declare a durable, non-auto-deleted exchange of the given kind
    async fn declare_exchange(&self, exchange: &str, kind: &ExchangeKind) -> Result<()>;

    /// Declare a queue, returning the broker's view of it
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueDescriptor>;

    /// Bind a queue to an exchange under a routing key
    async fn bind_queue(&self, binding: &BindingSpec) -> Result<()>;

    // ==================== Messaging ====================

    /// Register an auto-acknowledging consumer on a queue
    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Send a message to an exchange under a routing key
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<()>;

    // ==================== Lifecycle ====================

    /// Whether the link can currently carry broker calls
    fn is_connected(&self) -> bool;

    /// Close the channel, then the connection
    async fn close(&self) -> Result<()>;
}
