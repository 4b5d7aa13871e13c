//! Signal Relay - broker queue to stdout relay
//!
//! This is the main entry point: parse configuration, set up logging,
//! connect to the broker and run the relay until a shutdown signal.

mod cli;

use std::sync::Arc;

use clap::Parser;
use signal_broker::{AmqpLink, BrokerLink};
use signal_core::Relay;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Args;

// ==================== Logging ====================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signal_relay=info,signal_core=info,signal_broker=info".into());

    // stdout carries relayed bodies only; logs go to stderr.
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ==================== Shutdown ====================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let broker = args.broker_config();
    let config = args.relay_config();
    info!(
        exchange = %config.exchange,
        queue = %config.queue,
        routing_key = %config.routing_key,
        republish = config.republish.is_some(),
        "Starting signal relay"
    );

    let connect = async move {
        let link: Arc<dyn BrokerLink> = Arc::new(AmqpLink::connect(&broker).await?);
        Ok::<_, signal_types::Error>(link)
    };

    match Relay::new(config).run(connect, shutdown_signal()).await {
        Ok(stats) => {
            info!(relayed = stats.relayed, "Signal relay exited");
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            // No cleanup, the OS reclaims the connection.
            error!(stage = e.stage(), error = %e, "Relay failed");
            std::process::exit(1);
        }
        Err(e) => {
            warn!(stage = e.stage(), error = %e, "Relay ended on a publish error");
            Ok(())
        }
    }
}
