//! Relay - the top-level control flow
//!
//! Connect, provision the queue, then consume: a background task pulls
//! deliveries and hands each body to the relay loop through a single-slot
//! handoff; the relay loop writes the body to its output and optionally
//! republishes. The loop runs until the shutdown signal fires or the
//! configured lifetime elapses, then closes the link.
//!
//! Any error before consumption starts is returned to the caller, which is
//! expected to terminate. Publish errors are logged and the loop continues.

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use signal_broker::BrokerLink;
use signal_types::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::consumer::{self, Consumer};
use crate::handoff::{handoff, HandoffReceiver};
use crate::provisioner::QueueProvisioner;
use crate::publisher::Publisher;

/// Where the relay is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Establishing the broker link
    Connecting,
    /// Declaring and binding the queue
    Provisioning,
    /// Relaying deliveries
    Consuming,
    /// Subscription ended; waiting for shutdown
    Idle,
    /// Closing the broker link
    ShuttingDown,
    /// Link released
    Stopped,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Connecting => "connecting",
            RelayState::Provisioning => "provisioning",
            RelayState::Consuming => "consuming",
            RelayState::Idle => "idle",
            RelayState::ShuttingDown => "shutting-down",
            RelayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters reported when the relay stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bodies taken from the handoff and written to the output
    pub relayed: u64,
    /// Successful republishes
    pub published: u64,
    /// Republishes that failed or found the link not ready
    pub publish_failures: u64,
}

/// The relay loop
pub struct Relay {
    config: RelayConfig,
    provisioner: QueueProvisioner,
    consumer: Consumer,
    publisher: Publisher,
    output: Box<dyn Write + Send>,
    state: watch::Sender<RelayState>,
}

impl Relay {
    /// Create a relay writing bodies to stdout
    pub fn new(config: RelayConfig) -> Self {
        let (state, _) = watch::channel(RelayState::Connecting);
        Self {
            provisioner: QueueProvisioner::new(),
            consumer: Consumer::new(&config.consumer_tag),
            publisher: Publisher::new(&config.exchange, &config.routing_key),
            output: Box::new(std::io::stdout()),
            config,
            state,
        }
    }

    /// Write relayed bodies somewhere other than stdout
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Observe state transitions
    pub fn state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RelayState) {
        info!(state = %next, "Relay state");
        self.state.send_replace(next);
    }

    /// Run the relay to completion.
    ///
    /// `connect` establishes the broker link; `shutdown` resolves when the
    /// relay should stop. The shutdown signal and the lifetime timer cover
    /// the whole run, start-up included. Returns the relay counters after
    /// the link is closed, or the first fatal error.
    pub async fn run<C, S>(mut self, connect: C, shutdown: S) -> Result<RelayStats>
    where
        C: Future<Output = Result<Arc<dyn BrokerLink>>>,
        S: Future<Output = ()>,
    {
        self.config.validate()?;

        let stop = stop_signal(shutdown, self.config.lifetime);
        tokio::pin!(stop);

        let started = tokio::select! {
            _ = &mut stop => None,
            started = self.start(connect) => Some(started?),
        };
        let Some((link, receiver, delivery_loop)) = started else {
            // A link opened mid start-up is dropped with the start-up future.
            warn!("Stopped before consuming started");
            self.transition(RelayState::ShuttingDown);
            self.transition(RelayState::Stopped);
            return Ok(RelayStats::default());
        };

        let stats = self.relay_until(link.as_ref(), receiver, stop).await;

        self.transition(RelayState::ShuttingDown);
        delivery_loop.abort();
        if let Err(e) = link.close().await {
            warn!(error = %e, "Failed to close broker link cleanly");
        }
        self.transition(RelayState::Stopped);

        info!(
            relayed = stats.relayed,
            published = stats.published,
            publish_failures = stats.publish_failures,
            "Relay stopped"
        );
        Ok(stats)
    }

    /// Connect, provision and subscribe, then start the delivery loop
    async fn start<C>(
        &mut self,
        connect: C,
    ) -> Result<(Arc<dyn BrokerLink>, HandoffReceiver<Bytes>, JoinHandle<u64>)>
    where
        C: Future<Output = Result<Arc<dyn BrokerLink>>>,
    {
        self.transition(RelayState::Connecting);
        let link = connect.await?;

        self.transition(RelayState::Provisioning);
        if self.config.declare_exchange {
            self.provisioner
                .declare_exchange(
                    link.as_ref(),
                    &self.config.exchange,
                    &self.config.exchange_kind,
                )
                .await?;
        }
        self.provisioner
            .provision(link.as_ref(), &self.config.queue, &self.config.binding())
            .await?;

        let deliveries = self
            .consumer
            .consume(link.as_ref(), &self.config.queue)
            .await?;
        let (sender, receiver) = handoff();
        let delivery_loop = tokio::spawn(consumer::forward(deliveries, sender));

        self.transition(RelayState::Consuming);
        info!(" [*] Waiting for messages. To exit press CTRL+C");

        Ok((link, receiver, delivery_loop))
    }

    async fn relay_until<S>(
        &mut self,
        link: &dyn BrokerLink,
        mut receiver: HandoffReceiver<Bytes>,
        stop: S,
    ) -> RelayStats
    where
        S: Future<Output = ()>,
    {
        let mut stats = RelayStats::default();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                body = receiver.receive() => match body {
                    Some(body) => self.relay_one(link, body, &mut stats).await,
                    None => {
                        warn!("Subscription ended, waiting for shutdown");
                        self.transition(RelayState::Idle);
                        (&mut stop).await;
                        break;
                    }
                },
            }
        }

        stats
    }

    async fn relay_one(&mut self, link: &dyn BrokerLink, body: Bytes, stats: &mut RelayStats) {
        if let Err(e) = write_line(&mut self.output, &body) {
            warn!(error = %e, "Failed to write relayed message");
        }
        stats.relayed += 1;

        let Some(outbound) = self.config.republish.clone() else {
            return;
        };
        match self.publisher.publish(Some(link), outbound).await {
            Ok(()) => stats.published += 1,
            Err(e) => {
                warn!(error = %e, "Failed to republish message");
                stats.publish_failures += 1;
            }
        }
    }
}

/// Write `body` as-is, newline terminated
fn write_line(output: &mut dyn Write, body: &[u8]) -> std::io::Result<()> {
    output.write_all(body)?;
    output.write_all(b"\n")?;
    output.flush()
}

/// Resolves when `shutdown` fires or `lifetime` elapses, whichever is first
async fn stop_signal<S>(shutdown: S, lifetime: Option<Duration>)
where
    S: Future<Output = ()>,
{
    let lifetime_elapsed = async {
        match lifetime {
            Some(lifetime) => tokio::time::sleep(lifetime).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = shutdown => info!("Shutdown signal received"),
        _ = lifetime_elapsed => info!(?lifetime, "Lifetime elapsed, shutting down"),
    }
}
