//! Telemetry Bus Publishing
//!
//! Publishes per-tick snapshots to a message bus:
//! - AMQP channel with durable exchange declaration
//! - Publisher confirms surfaced as a boolean acknowledgment
//! - Negative acknowledgments reported as errors

mod channel;
mod publisher;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use channel::{AmqpChannel, BusChannel};
pub use publisher::{Publish, PublishTarget, SnapshotPublisher, CONTENT_TYPE_JSON};

use thiserror::Error;

/// Bus error types
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Failed to declare exchange '{exchange}': {reason}")]
    Declare { exchange: String, reason: String },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Broker rejected message for '{exchange}/{routing_key}'")]
    Nacked {
        exchange: String,
        routing_key: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}
