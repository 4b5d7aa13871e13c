//! Consumer - subscribes to a queue and feeds deliveries into a handoff

use bytes::Bytes;
use futures::StreamExt;
use signal_broker::{BrokerLink, DeliveryStream};
use signal_types::Result;
use tracing::{debug, error, info};

use crate::handoff::HandoffSender;

/// Auto-acknowledging subscriber with a fixed consumer tag
#[derive(Debug, Clone)]
pub struct Consumer {
    consumer_tag: String,
}

impl Consumer {
    pub fn new(consumer_tag: impl Into<String>) -> Self {
        Self {
            consumer_tag: consumer_tag.into(),
        }
    }

    /// Register on `queue_name` and return its deliveries.
    ///
    /// The broker drops each message from the queue as soon as it is
    /// delivered. The stream cannot be restarted; call `consume` again for
    /// a new subscription.
    pub async fn consume(
        &self,
        link: &dyn BrokerLink,
        queue_name: &str,
    ) -> Result<DeliveryStream> {
        let deliveries = link.subscribe(queue_name, &self.consumer_tag).await?;
        info!(
            queue = %queue_name,
            consumer_tag = %self.consumer_tag,
            "Consumer registered"
        );
        Ok(deliveries)
    }
}

/// Push every delivery's body through `handoff`, one at a time.
///
/// The next delivery is not pulled until the previous body has been taken
/// from the slot. Returns how many bodies were handed off once the
/// subscription ends, a delivery fails, or the receiving side goes away.
pub async fn forward(mut deliveries: DeliveryStream, handoff: HandoffSender<Bytes>) -> u64 {
    let mut forwarded = 0;

    while let Some(delivery) = deliveries.next().await {
        let message = match delivery {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Delivery failed, ending subscription");
                break;
            }
        };

        info!("Received a message: {}", String::from_utf8_lossy(&message.body));
        debug!(
            delivery_tag = message.metadata.delivery_tag,
            routing_key = %message.metadata.routing_key,
            redelivered = message.metadata.redelivered,
            "Delivery metadata"
        );

        let (body, _) = message.into_parts();
        if handoff.send(body).await.is_err() {
            debug!("Relay loop stopped receiving, ending delivery loop");
            break;
        }
        forwarded += 1;
    }

    debug!(forwarded, "Delivery loop finished");
    forwarded
}
