//! End-to-end relay behavior against the in-memory broker

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use signal_broker::{BrokerCall, BrokerLink, DeliveryStream, MemoryBroker};
use signal_core::consumer::forward;
use signal_core::{handoff, Consumer, Relay, RelayConfig, RelayState, RelayStats};
use signal_types::{
    BindingSpec, Error, ExchangeKind, OutboundMessage, QueueDescriptor, QueueOptions, Result,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Captures what the relay writes to its output
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Delegates to a memory broker but rejects every publish
struct RejectingPublishes(Arc<MemoryBroker>);

#[async_trait]
impl BrokerLink for RejectingPublishes {
    async fn declare_exchange(&self, exchange: &str, kind: &ExchangeKind) -> Result<()> {
        self.0.declare_exchange(exchange, kind).await
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueDescriptor> {
        self.0.declare_queue(name, options).await
    }

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<()> {
        self.0.bind_queue(binding).await
    }

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        self.0.subscribe(queue, consumer_tag).await
    }

    async fn publish(&self, exchange: &str, _: &str, _: &OutboundMessage) -> Result<()> {
        Err(Error::PublishFailed {
            exchange: exchange.to_string(),
            reason: "NO_ROUTE".to_string(),
        })
    }

    fn is_connected(&self) -> bool {
        self.0.is_connected()
    }

    async fn close(&self) -> Result<()> {
        self.0.close().await
    }
}

fn hello_config() -> RelayConfig {
    RelayConfig {
        exchange: "signal-exchange".to_string(),
        routing_key: "signal-key".to_string(),
        queue: "hello".to_string(),
        ..Default::default()
    }
}

fn broker() -> Arc<MemoryBroker> {
    Arc::new(MemoryBroker::new().with_exchange("signal-exchange", ExchangeKind::Direct))
}

fn connected(link: Arc<dyn BrokerLink>) -> impl Future<Output = Result<Arc<dyn BrokerLink>>> {
    async move { Ok(link) }
}

/// A running relay plus the handles a test needs to drive it
struct Running {
    output: SharedOutput,
    state: tokio::sync::watch::Receiver<RelayState>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<RelayStats>>,
}

impl Running {
    async fn start(config: RelayConfig, link: Arc<dyn BrokerLink>) -> Self {
        let output = SharedOutput::default();
        let relay = Relay::new(config).with_output(output.clone());
        let mut state = relay.state();
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(relay.run(connected(link), async move {
            let _ = stopped.await;
        }));

        state
            .wait_for(|s| *s == RelayState::Consuming)
            .await
            .expect("relay never started consuming");

        Self {
            output,
            state,
            stop,
            task,
        }
    }

    async fn shutdown(self) -> RelayStats {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap()
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Route log events from the current thread into a buffer
fn capture_logs() -> (SharedOutput, tracing::subscriber::DefaultGuard) {
    let logs = SharedOutput::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn relays_ping_and_republishes() {
    let (logs, _guard) = capture_logs();
    let broker = broker();
    let config = RelayConfig {
        republish: Some("yo".into()),
        ..hello_config()
    };
    let relay = Running::start(config, broker.clone()).await;

    broker
        .publish("signal-exchange", "signal-key", &OutboundMessage::json("ping"))
        .await
        .unwrap();

    eventually("the republish", || broker.published().len() >= 2).await;
    let output = relay.output.clone();
    let stats = relay.shutdown().await;

    let lines = output.lines();
    assert_eq!(lines[0], "ping");
    // The republished body routes back into the same queue.
    assert!(lines[1..].iter().all(|line| line == "yo"));

    let published = broker.published();
    assert_eq!(published[0].message.body_as_str(), Some("ping"));
    assert_eq!(published[1].message.body_as_str(), Some("yo"));
    assert_eq!(published[1].exchange, "signal-exchange");
    assert_eq!(published[1].routing_key, "signal-key");
    assert_eq!(published[1].message.content_type, "application/json");
    assert!(stats.published >= 1);
    assert_eq!(stats.publish_failures, 0);

    let logs = logs.text();
    assert!(logs.contains("Queue declared"));
    assert!(logs.contains("queue=hello"));
    assert!(logs.contains("Waiting for messages. To exit press CTRL+C"));
    assert!(logs.contains("Received a message: ping"));
    assert!(logs.contains("publishing 2B body (yo)"));
    assert!(logs.contains("Relay stopped"));
}

#[tokio::test]
async fn relays_bodies_byte_for_byte() {
    let broker = broker();
    let relay = Running::start(hello_config(), broker.clone()).await;

    broker.enqueue("hello", vec![0xff, 0x41]).unwrap();
    broker.enqueue("hello", "ping").unwrap();

    let output = relay.output.clone();
    eventually("both bodies", || output.bytes().len() == 8).await;
    relay.shutdown().await;

    assert_eq!(output.bytes(), b"\xffA\nping\n");
}

#[tokio::test]
async fn relays_in_delivery_order() {
    let broker = broker();
    broker
        .declare_queue("hello", QueueOptions::durable())
        .await
        .unwrap();
    for i in 0..20 {
        broker.enqueue("hello", format!("message-{}", i)).unwrap();
    }

    let relay = Running::start(hello_config(), broker.clone()).await;
    let output = relay.output.clone();
    eventually("all messages", || output.lines().len() == 20).await;
    let stats = relay.shutdown().await;

    let expected: Vec<String> = (0..20).map(|i| format!("message-{}", i)).collect();
    assert_eq!(output.lines(), expected);
    assert_eq!(stats.relayed, 20);
    assert_eq!(stats.published, 0);
    assert!(broker.published().is_empty());
}

#[tokio::test]
async fn uses_configured_queue_and_consumer_tag() {
    let broker = broker();
    let config = RelayConfig {
        queue: "signal-queue".to_string(),
        consumer_tag: "relay-7".to_string(),
        ..hello_config()
    };

    let relay = Running::start(config, broker.clone()).await;
    relay.shutdown().await;

    assert_eq!(
        broker.bindings(),
        vec![BindingSpec::new("signal-exchange", "signal-key", "signal-queue")]
    );
    assert_eq!(broker.queue_depth("hello"), None);
    assert!(broker.calls().contains(&BrokerCall::Subscribe {
        queue: "signal-queue".to_string(),
        consumer_tag: "relay-7".to_string(),
    }));
}

#[tokio::test]
async fn publish_failures_do_not_stop_the_relay() {
    let broker = broker();
    let link: Arc<dyn BrokerLink> = Arc::new(RejectingPublishes(broker.clone()));
    let config = RelayConfig {
        republish: Some("yo".into()),
        ..hello_config()
    };
    let relay = Running::start(config, link).await;

    broker.enqueue("hello", "first").unwrap();
    broker.enqueue("hello", "second").unwrap();

    let output = relay.output.clone();
    eventually("both messages", || output.lines().len() == 2).await;
    let stats = relay.shutdown().await;

    assert_eq!(output.lines(), vec!["first", "second"]);
    assert_eq!(stats.relayed, 2);
    assert_eq!(stats.published, 0);
    assert_eq!(stats.publish_failures, 2);
}

#[tokio::test]
async fn ended_subscription_leaves_relay_idle() {
    let broker = broker();
    let mut relay = Running::start(hello_config(), broker.clone()).await;

    // Tearing the link down ends the subscription stream.
    broker.close().await.unwrap();
    relay
        .state
        .wait_for(|s| *s == RelayState::Idle)
        .await
        .unwrap();

    let stats = relay.shutdown().await;
    assert_eq!(stats, RelayStats::default());
}

#[tokio::test(start_paused = true)]
async fn consumer_stays_at_most_one_message_ahead() {
    let broker = broker();
    broker
        .declare_queue("hello", QueueOptions::durable())
        .await
        .unwrap();
    for i in 0..5 {
        broker.enqueue("hello", format!("m{}", i)).unwrap();
    }

    let deliveries = Consumer::new("signal-consumer")
        .consume(broker.as_ref(), "hello")
        .await
        .unwrap();
    let (sender, mut receiver) = handoff();
    let delivery_loop = tokio::spawn(forward(deliveries, sender));

    // Paused time only advances once every task is idle.
    let settle = || tokio::time::sleep(Duration::from_millis(100));

    settle().await;
    assert_eq!(broker.pulled(), 1);
    assert_eq!(broker.queue_depth("hello"), Some(4));

    for taken in 1..=5u64 {
        let body = receiver.receive().await.unwrap();
        assert_eq!(body, format!("m{}", taken - 1));

        // One delivery ahead of the relay, never more.
        settle().await;
        assert_eq!(
            broker.pulled(),
            (taken + 1).min(5),
            "deliveries pulled after {} were taken",
            taken
        );
    }

    assert_eq!(broker.pulled(), 5);
    drop(receiver);
    broker.close().await.unwrap();
    assert_eq!(delivery_loop.await.unwrap(), 5);
}
