//! In-memory broker link
//!
//! Behaves like a single-node broker with direct routing: exchanges,
//! queues, bindings and auto-ack subscriptions, all in process memory.
//! Every call is recorded so tests can assert on what reached the broker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use signal_types::{
    BindingSpec, DeliveryMetadata, Error, ExchangeKind, InboundMessage, OutboundMessage,
    QueueDescriptor, QueueOptions, Result,
};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::traits::{BrokerLink, DeliveryStream};

/// A broker call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    DeclareExchange(String),
    DeclareQueue(String),
    Bind(BindingSpec),
    Subscribe { queue: String, consumer_tag: String },
    Publish { exchange: String, routing_key: String },
    Close,
}

/// A message accepted by `publish`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub message: OutboundMessage,
}

/// Internal queue data structure
struct QueueData {
    options: QueueOptions,
    /// Ready messages
    messages: Mutex<VecDeque<InboundMessage>>,
    /// Signalled on enqueue and on close
    ready: Notify,
    consumers: AtomicU32,
}

impl QueueData {
    fn new(options: QueueOptions) -> Self {
        Self {
            options,
            messages: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            consumers: AtomicU32::new(0),
        }
    }

    fn push(&self, message: InboundMessage) {
        self.messages.lock().push_back(message);
        self.ready.notify_waiters();
    }
}

/// Keeps the consumer count honest while a subscription stream is alive
struct Subscription {
    queue: Arc<QueueData>,
    closed: Arc<AtomicBool>,
    pulled: Arc<AtomicU64>,
}

impl Subscription {
    /// Wait for the next ready message; `None` once the broker is closed.
    async fn next_message(&self) -> Option<InboundMessage> {
        loop {
            // Registered before checking state so a concurrent push is not missed.
            let ready = self.queue.ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            let next = self.queue.messages.lock().pop_front();
            if let Some(message) = next {
                self.pulled.fetch_add(1, Ordering::SeqCst);
                return Some(message);
            }

            ready.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.consumers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory broker implementation
pub struct MemoryBroker {
    exchanges: DashMap<String, ExchangeKind>,
    queues: DashMap<String, Arc<QueueData>>,
    bindings: RwLock<Vec<BindingSpec>>,
    published: Mutex<Vec<PublishedMessage>>,
    calls: Mutex<Vec<BrokerCall>>,
    /// Deliveries handed out by all subscriptions
    pulled: Arc<AtomicU64>,
    next_delivery_tag: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        info!("Initializing in-memory broker");
        Self {
            exchanges: DashMap::new(),
            queues: DashMap::new(),
            bindings: RwLock::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            pulled: Arc::new(AtomicU64::new(0)),
            next_delivery_tag: AtomicU64::new(1),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register an exchange that exists before the relay starts
    pub fn with_exchange(self, name: impl Into<String>, kind: ExchangeKind) -> Self {
        self.exchanges.insert(name.into(), kind);
        self
    }

    /// Put a message straight onto a queue, as if routed by the broker
    pub fn enqueue(&self, queue: &str, body: impl Into<Bytes>) -> Result<()> {
        let queue_data = self
            .queues
            .get(queue)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| Error::PublishFailed {
                exchange: String::new(),
                reason: format!("NOT_FOUND - no queue '{}'", queue),
            })?;

        queue_data.push(self.delivery(body.into(), "", queue, None));
        Ok(())
    }

    /// Ready messages on a queue, if it exists
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.queues.get(queue).map(|q| q.messages.lock().len())
    }

    /// Whether an exchange exists
    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.exchanges.contains_key(exchange)
    }

    /// Current bindings
    pub fn bindings(&self) -> Vec<BindingSpec> {
        self.bindings.read().clone()
    }

    /// Every message accepted by `publish`
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Every call made on this link
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().clone()
    }

    /// Deliveries pulled off all subscriptions so far
    pub fn pulled(&self) -> u64 {
        self.pulled.load(Ordering::SeqCst)
    }

    fn record(&self, call: BrokerCall) {
        self.calls.lock().push(call);
    }

    fn delivery(
        &self,
        body: Bytes,
        exchange: &str,
        routing_key: &str,
        content_type: Option<String>,
    ) -> InboundMessage {
        let metadata = DeliveryMetadata {
            delivery_tag: self.next_delivery_tag.fetch_add(1, Ordering::SeqCst),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            redelivered: false,
            content_type,
            received_at: Utc::now(),
        };
        InboundMessage::new(body, metadata)
    }

    fn ensure_open(&self) -> std::result::Result<(), String> {
        if self.closed.load(Ordering::SeqCst) {
            Err("channel/connection is not open".to_string())
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerLink for MemoryBroker {
    // ==================== Topology ====================

    async fn declare_exchange(&self, exchange: &str, kind: &ExchangeKind) -> Result<()> {
        self.record(BrokerCall::DeclareExchange(exchange.to_string()));
        let failed = |reason: String| Error::ExchangeDeclareFailed {
            exchange: exchange.to_string(),
            reason,
        };
        self.ensure_open().map_err(failed)?;

        if let Some(existing) = self.exchanges.get(exchange) {
            if existing.value() != kind {
                return Err(failed(format!(
                    "PRECONDITION_FAILED - inequivalent arg 'type' for exchange '{}': received '{}' but current is '{}'",
                    exchange,
                    kind,
                    existing.value()
                )));
            }
            return Ok(());
        }

        self.exchanges.insert(exchange.to_string(), kind.clone());
        info!(exchange = %exchange, kind = %kind, "Exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueDescriptor> {
        self.record(BrokerCall::DeclareQueue(name.to_string()));
        let failed = |reason: String| Error::DeclareFailed {
            queue: name.to_string(),
            reason,
        };
        self.ensure_open().map_err(failed)?;

        let queue_data = Arc::clone(
            self.queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(QueueData::new(options)))
                .value(),
        );

        if queue_data.options.durable != options.durable {
            return Err(failed(format!(
                "PRECONDITION_FAILED - inequivalent arg 'durable' for queue '{}': received '{}' but current is '{}'",
                name, options.durable, queue_data.options.durable
            )));
        }

        let descriptor = QueueDescriptor {
            name: name.to_string(),
            durable: queue_data.options.durable,
            message_count: queue_data.messages.lock().len() as u32,
            consumer_count: queue_data.consumers.load(Ordering::SeqCst),
        };

        debug!(queue = %name, messages = descriptor.message_count, "Queue declared");
        Ok(descriptor)
    }

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<()> {
        self.record(BrokerCall::Bind(binding.clone()));
        let failed = |reason: String| Error::BindFailed {
            queue: binding.queue_name.clone(),
            exchange: binding.exchange.clone(),
            routing_key: binding.routing_key.clone(),
            reason,
        };
        self.ensure_open().map_err(failed)?;

        if !self.queues.contains_key(&binding.queue_name) {
            return Err(failed(format!(
                "NOT_FOUND - no queue '{}'",
                binding.queue_name
            )));
        }
        if !self.exchanges.contains_key(&binding.exchange) {
            return Err(failed(format!(
                "NOT_FOUND - no exchange '{}'",
                binding.exchange
            )));
        }

        let mut bindings = self.bindings.write();
        if !bindings.contains(binding) {
            bindings.push(binding.clone());
            debug!(
                queue = %binding.queue_name,
                exchange = %binding.exchange,
                routing_key = %binding.routing_key,
                "Queue bound"
            );
        }
        Ok(())
    }

    // ==================== Messaging ====================

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.record(BrokerCall::Subscribe {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
        });
        let failed = |reason: String| Error::SubscribeFailed {
            queue: queue.to_string(),
            reason,
        };
        self.ensure_open().map_err(failed)?;

        let queue_data = self
            .queues
            .get(queue)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| failed(format!("NOT_FOUND - no queue '{}'", queue)))?;

        queue_data.consumers.fetch_add(1, Ordering::SeqCst);
        let subscription = Subscription {
            queue: queue_data,
            closed: Arc::clone(&self.closed),
            pulled: Arc::clone(&self.pulled),
        };

        let deliveries = stream::unfold(subscription, |subscription| async move {
            let message = subscription.next_message().await?;
            Some((Ok(message), subscription))
        });

        Ok(deliveries.boxed())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &OutboundMessage,
    ) -> Result<()> {
        self.record(BrokerCall::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        });
        let failed = |reason: String| Error::PublishFailed {
            exchange: exchange.to_string(),
            reason,
        };
        self.ensure_open().map_err(failed)?;

        // The nameless default exchange routes by queue name.
        let targets: Vec<String> = if exchange.is_empty() {
            vec![routing_key.to_string()]
        } else {
            if !self.exchanges.contains_key(exchange) {
                return Err(failed(format!("NOT_FOUND - no exchange '{}'", exchange)));
            }
            self.bindings
                .read()
                .iter()
                .filter(|b| b.matches(exchange, routing_key))
                .map(|b| b.queue_name.clone())
                .collect()
        };

        for target in &targets {
            if let Some(queue_data) = self.queues.get(target) {
                queue_data.push(self.delivery(
                    message.body.clone(),
                    exchange,
                    routing_key,
                    Some(message.content_type.clone()),
                ));
            }
        }

        self.published.lock().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: message.clone(),
        });

        debug!(
            exchange = %exchange,
            routing_key = %routing_key,
            routed = targets.len(),
            "Message published"
        );
        Ok(())
    }

    // ==================== Lifecycle ====================

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.record(BrokerCall::Close);
        self.closed.store(true, Ordering::SeqCst);
        for queue_data in self.queues.iter() {
            queue_data.ready.notify_waiters();
        }
        info!("In-memory broker closed");
        Ok(())
    }
}
