//! Signal Types - Core domain types for the signal relay
//!
//! This crate contains all shared types used across relay components.

pub mod error;
pub mod message;
pub mod queue;

// Re-export commonly used types
pub use error::{Error, Result};
pub use message::{DeliveryMetadata, DeliveryMode, InboundMessage, OutboundMessage};
pub use queue::{BindingSpec, ExchangeKind, QueueDescriptor, QueueOptions};
