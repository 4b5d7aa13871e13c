//! Error types for the signal relay
//!
//! Defines the error taxonomy shared by every layer. Broker-reported errors
//! are carried as text so this crate stays independent of the broker client.

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Could not establish a connection to the broker
    #[error("Failed to connect to broker: {0}")]
    ConnectionFailed(String),

    /// Connected, but could not open a channel on the connection
    #[error("Failed to open a channel: {0}")]
    ChannelOpenFailed(String),

    /// Exchange declaration was rejected
    #[error("Exchange declare failed for {exchange}: {reason}")]
    ExchangeDeclareFailed { exchange: String, reason: String },

    /// Queue declaration was rejected
    #[error("Queue declare failed for {queue}: {reason}")]
    DeclareFailed { queue: String, reason: String },

    /// Queue binding was rejected (e.g. the exchange does not exist)
    #[error("Queue bind failed for {queue} -> {exchange} (key {routing_key}): {reason}")]
    BindFailed {
        queue: String,
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// Consumer registration was rejected
    #[error("Failed to register a consumer on {queue}: {reason}")]
    SubscribeFailed { queue: String, reason: String },

    /// The broker refused or failed a publish
    #[error("Exchange publish failed for {exchange}: {reason}")]
    PublishFailed { exchange: String, reason: String },

    /// Publish attempted before the link was established
    #[error("connection to the broker might not be ready yet")]
    NotReady,

    /// The other side of a handoff went away
    #[error("Handoff closed")]
    HandoffClosed,

    /// Closing the channel or the connection failed
    #[error("Failed to close the broker link: {0}")]
    CloseFailed(String),

    /// Configuration rejected before any broker call
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Lifecycle stage the error belongs to, used in the fatal log line.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::ConnectionFailed(_) | Error::ChannelOpenFailed(_) => "connect",
            Error::ExchangeDeclareFailed { .. }
            | Error::DeclareFailed { .. }
            | Error::BindFailed { .. } => "provision",
            Error::SubscribeFailed { .. } => "subscribe",
            Error::PublishFailed { .. } | Error::NotReady => "publish",
            Error::HandoffClosed => "handoff",
            Error::CloseFailed(_) => "shutdown",
            Error::InvalidConfig(_) => "config",
        }
    }

    /// Whether the error ends the relay.
    ///
    /// Publish errors go back to the caller and the relay keeps going;
    /// everything else terminates the process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::PublishFailed { .. } | Error::NotReady)
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;
