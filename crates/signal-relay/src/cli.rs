//! Command line and environment configuration

use std::time::Duration;

use clap::Parser;
use signal_broker::BrokerConfig;
use signal_core::RelayConfig;
use signal_types::ExchangeKind;

#[derive(Parser, Debug)]
#[command(name = "signal-relay")]
#[command(about = "Relay messages from a broker queue to stdout", long_about = None)]
pub struct Args {
    /// Durable, non-auto-deleted exchange name
    #[arg(long, default_value = "signal-exchange")]
    pub exchange: String,

    /// Exchange type - direct|fanout|topic|headers|x-custom
    #[arg(long, default_value = "direct", value_parser = parse_exchange_kind)]
    pub exchange_type: ExchangeKind,

    /// Declare the exchange with --exchange-type instead of assuming it exists
    #[arg(long)]
    pub declare_exchange: bool,

    /// Durable queue to provision and consume from
    #[arg(long, default_value = "signal-queue")]
    pub queue: String,

    /// Binding and publishing routing key
    #[arg(long, default_value = "signal-key")]
    pub key: String,

    /// Consumer tag used for the subscription
    #[arg(long, default_value = "signal-consumer")]
    pub consumer_tag: String,

    /// Lifetime of process before shutdown (0s=infinite)
    #[arg(long, default_value = "0s", value_parser = humantime::parse_duration)]
    pub lifetime: Duration,

    /// Publish --outbound-body after every relayed message
    #[arg(long)]
    pub republish: bool,

    /// Body to republish
    #[arg(long, default_value = "yo")]
    pub outbound_body: String,

    /// Broker user
    #[arg(long, env = "QUSER", default_value = "guest")]
    pub user: String,

    /// Broker password
    #[arg(long, env = "QPASSWORD", default_value = "guest", hide_env_values = true)]
    pub password: String,

    /// Broker host
    #[arg(long, env = "QHOST", default_value = "localhost")]
    pub host: String,

    /// Broker port
    #[arg(long, env = "QPORT", default_value_t = 5672)]
    pub port: u16,

    /// Broker virtual host
    #[arg(long, env = "QVHOST", default_value = "test")]
    pub vhost: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

fn parse_exchange_kind(value: &str) -> Result<ExchangeKind, signal_types::Error> {
    value.parse()
}

impl Args {
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            user: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            vhost: self.vhost.clone(),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            exchange: self.exchange.clone(),
            exchange_kind: self.exchange_type.clone(),
            declare_exchange: self.declare_exchange,
            queue: self.queue.clone(),
            routing_key: self.key.clone(),
            consumer_tag: self.consumer_tag.clone(),
            lifetime: (!self.lifetime.is_zero()).then_some(self.lifetime),
            republish: self
                .republish
                .then(|| self.outbound_body.clone().into()),
        }
    }
}
