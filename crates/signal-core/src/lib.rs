//! Signal Core - Core relay logic
//!
//! This crate contains the relay implementation including:
//! - QueueProvisioner: queue declaration and binding
//! - Consumer: subscription and the delivery loop
//! - Handoff: the single-slot rendezvous between the two tasks
//! - Publisher: republishing to the exchange
//! - Relay: the top-level state machine

pub mod config;
pub mod consumer;
pub mod handoff;
pub mod provisioner;
pub mod publisher;
pub mod relay;

// Re-exports
pub use config::RelayConfig;
pub use consumer::Consumer;
pub use handoff::{handoff, HandoffReceiver, HandoffSender};
pub use provisioner::QueueProvisioner;
pub use publisher::Publisher;
pub use relay::{Relay, RelayState, RelayStats};
