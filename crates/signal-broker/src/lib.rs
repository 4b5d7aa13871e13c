//! Signal Broker - Broker links for the signal relay
//!
//! This crate provides pluggable broker link implementations.
//! Currently supports:
//! - AMQP 0-9-1 over `lapin` (default)
//! - In-memory broker (default, for development/testing)

pub mod traits;

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(feature = "memory")]
pub mod memory;

// Re-exports
pub use traits::{BrokerLink, DeliveryStream};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpLink, BrokerConfig};

#[cfg(feature = "memory")]
pub use memory::{BrokerCall, MemoryBroker, PublishedMessage};
