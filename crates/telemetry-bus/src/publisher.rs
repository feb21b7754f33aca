//! Snapshot Publisher

use crate::channel::BusChannel;
use crate::BusError;
use async_trait::async_trait;
use tracing::{debug, info};
use vehicle_api::Snapshot;

/// Content type attached to every snapshot message
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Something that accepts finished snapshots
#[async_trait]
pub trait Publish: Send + Sync {
    /// Publish one snapshot; a negative acknowledgment is an error
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), BusError>;
}

/// Where snapshots go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Exchange name
    pub exchange: String,
    /// Exchange type (topic, fanout, direct, ...)
    pub exchange_type: String,
    /// Routing key for every message
    pub routing_key: String,
}

/// Serializes snapshots to JSON and hands them to a bus channel
pub struct SnapshotPublisher<C> {
    channel: C,
    target: PublishTarget,
}

impl<C: BusChannel> SnapshotPublisher<C> {
    /// Create new snapshot publisher
    pub fn new(channel: C, target: PublishTarget) -> Self {
        Self { channel, target }
    }

    /// Declare the target exchange (durable)
    pub async fn declare(&self) -> Result<(), BusError> {
        self.channel
            .declare_exchange(&self.target.exchange, &self.target.exchange_type)
            .await
    }

    /// Underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

#[async_trait]
impl<C: BusChannel> Publish for SnapshotPublisher<C> {
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), BusError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|e| BusError::Serialization(e.to_string()))?;

        let target = &self.target;
        debug!(
            "Writing snapshot to {} '{}/{}': {}",
            target.exchange_type,
            target.exchange,
            target.routing_key,
            String::from_utf8_lossy(&payload)
        );

        let acked = self
            .channel
            .publish(
                &target.exchange,
                &target.routing_key,
                &payload,
                CONTENT_TYPE_JSON,
            )
            .await?;

        if !acked {
            return Err(BusError::Nacked {
                exchange: target.exchange.clone(),
                routing_key: target.routing_key.clone(),
            });
        }

        info!(
            "Published snapshot with {} categories ({} bytes)",
            snapshot.len(),
            payload.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingChannel;
    use serde_json::json;
    use vehicle_api::Category;

    fn target() -> PublishTarget {
        PublishTarget {
            exchange: "vehicles".to_string(),
            exchange_type: "topic".to_string(),
            routing_key: "tesla.telemetry".to_string(),
        }
    }

    fn snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(Category::VehicleInfo, json!({"state": "online"}));
        snapshot.insert(Category::DriveState, json!({"shift_state": "D"}));
        snapshot
    }

    #[tokio::test]
    async fn test_publish_sends_json_to_target() {
        let publisher = SnapshotPublisher::new(RecordingChannel::new(), target());
        publisher.publish(&snapshot()).await.unwrap();

        let messages = publisher.channel().messages();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.exchange, "vehicles");
        assert_eq!(message.routing_key, "tesla.telemetry");
        assert_eq!(message.content_type, CONTENT_TYPE_JSON);

        let body: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(
            body,
            json!({"vehicle_info": {"state": "online"}, "drive_state": {"shift_state": "D"}})
        );
    }

    #[tokio::test]
    async fn test_negative_ack_is_error() {
        let channel = RecordingChannel::new();
        channel.push_ack(false);
        let publisher = SnapshotPublisher::new(channel, target());

        let err = publisher.publish(&snapshot()).await.unwrap_err();
        assert!(matches!(err, BusError::Nacked { ref exchange, .. } if exchange == "vehicles"));

        // Next publish is acknowledged again
        publisher.publish(&snapshot()).await.unwrap();
        assert_eq!(publisher.channel().messages().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let channel = RecordingChannel::new();
        channel.push_failure(BusError::Publish("channel closed".to_string()));
        let publisher = SnapshotPublisher::new(channel, target());

        let err = publisher.publish(&snapshot()).await.unwrap_err();
        assert!(matches!(err, BusError::Publish(_)));
    }

    #[tokio::test]
    async fn test_declare_uses_target_type() {
        let publisher = SnapshotPublisher::new(RecordingChannel::new(), target());
        publisher.declare().await.unwrap();
        assert_eq!(
            publisher.channel().exchanges(),
            vec![("vehicles".to_string(), "topic".to_string())]
        );
    }
}
