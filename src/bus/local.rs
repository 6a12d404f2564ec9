//! In-process middleware bus.
//!
//! [`LocalBus`] wraps a [`tokio::sync::broadcast`] channel. Every publish
//! becomes a [`BusMessage`] delivered to all current subscribers; with no
//! subscribers the message is dropped, which is not an error.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::MiddlewareBus;
use crate::domain::DrivePayload;
use crate::error::PublishError;

/// One message as seen by a bus subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    /// Topic the payload was published on.
    pub topic: String,
    /// Published payload.
    pub payload: DrivePayload,
}

/// Broadcast-backed bus for deployments where the robot controller lives
/// in the same process.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    /// Creates a new `LocalBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a receiver that will see all future messages.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl MiddlewareBus for LocalBus {
    async fn publish(&self, topic: &str, payload: &DrivePayload) -> Result<(), PublishError> {
        let delivered = self
            .sender
            .send(BusMessage {
                topic: topic.to_string(),
                payload: *payload,
            })
            .unwrap_or(0);
        tracing::trace!(topic, delivered, "local bus publish");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_receivers_is_ok() {
        let bus = LocalBus::new(8);
        assert!(bus.publish("/robots/r1/cmd_vel", &DrivePayload::STOP).await.is_ok());
    }

    #[tokio::test]
    async fn subscriber_receives_topic_and_payload() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();
        let payload = DrivePayload {
            forward_back: 0.5,
            left_right: -0.2,
        };
        let _ = bus.publish("/robots/r1/cmd_vel", &payload).await;

        let Ok(msg) = rx.recv().await else {
            panic!("expected a message");
        };
        assert_eq!(msg.topic, "/robots/r1/cmd_vel");
        assert_eq!(msg.payload, payload);
    }

    #[test]
    fn receiver_count_tracks_subscribers() {
        let bus = LocalBus::new(8);
        assert_eq!(bus.receiver_count(), 0);
        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }
}
