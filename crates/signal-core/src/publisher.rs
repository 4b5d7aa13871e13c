//! Publisher - sends bodies to the configured exchange and routing key

use bytes::Bytes;
use signal_broker::BrokerLink;
use signal_types::{Error, OutboundMessage, Result};
use tracing::{debug, info};

/// Publishes transient JSON messages under a fixed exchange and routing key
#[derive(Debug, Clone)]
pub struct Publisher {
    exchange: String,
    routing_key: String,
}

impl Publisher {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    /// Publish `body` over `link`.
    ///
    /// A missing or closed link yields `NotReady` without any broker call.
    /// Broker failures come back as `PublishFailed` and are not retried.
    pub async fn publish(
        &self,
        link: Option<&dyn BrokerLink>,
        body: impl Into<Bytes>,
    ) -> Result<()> {
        let message = OutboundMessage::json(body);
        info!(
            "publishing {}B body ({})",
            message.body.len(),
            String::from_utf8_lossy(&message.body)
        );

        let link = match link {
            Some(link) if link.is_connected() => link,
            _ => return Err(Error::NotReady),
        };

        link.publish(&self.exchange, &self.routing_key, &message).await?;

        debug!(
            exchange = %self.exchange,
            routing_key = %self.routing_key,
            "Message published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_broker::{BrokerCall, MemoryBroker};
    use signal_types::{DeliveryMode, ExchangeKind};

    fn broker() -> MemoryBroker {
        MemoryBroker::new().with_exchange("signal-exchange", ExchangeKind::Direct)
    }

    #[tokio::test]
    async fn test_publish_sends_transient_json() {
        let broker = broker();
        let publisher = Publisher::new("signal-exchange", "signal-key");

        publisher.publish(Some(&broker), "yo").await.unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].exchange, "signal-exchange");
        assert_eq!(published[0].routing_key, "signal-key");
        assert_eq!(published[0].message.body_as_str(), Some("yo"));
        assert_eq!(published[0].message.content_type, "application/json");
        assert_eq!(published[0].message.delivery_mode, DeliveryMode::Transient);
        assert_eq!(published[0].message.priority, 0);
    }

    #[tokio::test]
    async fn test_missing_link_is_not_ready() {
        let publisher = Publisher::new("signal-exchange", "signal-key");

        let err = publisher.publish(None, "yo").await.unwrap_err();
        assert_eq!(err, Error::NotReady);
    }

    #[tokio::test]
    async fn test_closed_link_is_not_ready_and_makes_no_call() {
        let broker = broker();
        broker.close().await.unwrap();
        let publisher = Publisher::new("signal-exchange", "signal-key");

        let err = publisher.publish(Some(&broker), "yo").await.unwrap_err();

        assert_eq!(err, Error::NotReady);
        assert_eq!(broker.calls(), vec![BrokerCall::Close]);
        assert!(broker.published().is_empty());
    }

    #[tokio::test]
    async fn test_broker_rejection_is_publish_failed() {
        let broker = MemoryBroker::new();
        let publisher = Publisher::new("missing-exchange", "signal-key");

        let err = publisher.publish(Some(&broker), "yo").await.unwrap_err();

        assert!(matches!(err, Error::PublishFailed { .. }));
        assert!(!err.is_fatal());
    }
}
