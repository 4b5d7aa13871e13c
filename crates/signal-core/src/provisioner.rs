//! Queue provisioning
//!
//! Declares the relay's queue and binds it to the exchange. Both steps are
//! idempotent on the broker side, so provisioning can run on every start.

use signal_broker::BrokerLink;
use signal_types::{BindingSpec, ExchangeKind, QueueDescriptor, QueueOptions, Result};
use tracing::{debug, info};

/// Declares and binds queues
#[derive(Debug, Clone)]
pub struct QueueProvisioner {
    options: QueueOptions,
}

impl QueueProvisioner {
    /// Provisioner for durable, non-auto-deleted, non-exclusive queues
    pub fn new() -> Self {
        Self {
            options: QueueOptions::durable(),
        }
    }

    /// Declare the exchange the queue will be bound to
    pub async fn declare_exchange(
        &self,
        link: &dyn BrokerLink,
        exchange: &str,
        kind: &ExchangeKind,
    ) -> Result<()> {
        link.declare_exchange(exchange, kind).await?;
        info!(exchange = %exchange, kind = %kind, "Exchange declared");
        Ok(())
    }

    /// Declare `queue_name` and bind it as described by `binding`.
    ///
    /// Declare and bind failures come back as distinct errors; neither is
    /// retried.
    pub async fn provision(
        &self,
        link: &dyn BrokerLink,
        queue_name: &str,
        binding: &BindingSpec,
    ) -> Result<QueueDescriptor> {
        info!(queue = %queue_name, "Declaring queue");
        let descriptor = link.declare_queue(queue_name, self.options).await?;

        info!(
            queue = %descriptor.name,
            messages = descriptor.message_count,
            consumers = descriptor.consumer_count,
            routing_key = %binding.routing_key,
            "Queue declared, binding to exchange"
        );
        if let Ok(snapshot) = serde_json::to_string(&descriptor) {
            debug!(descriptor = %snapshot, "Queue snapshot");
        }

        let binding = BindingSpec {
            queue_name: descriptor.name.clone(),
            ..binding.clone()
        };
        link.bind_queue(&binding).await?;

        info!(
            queue = %binding.queue_name,
            exchange = %binding.exchange,
            routing_key = %binding.routing_key,
            "Queue bound"
        );
        Ok(descriptor)
    }
}

impl Default for QueueProvisioner {
    fn default() -> Self {
        Self::new()
    }
}
