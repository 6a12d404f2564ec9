//! Middleware bus seam.
//!
//! The bridge never talks to a concrete pub/sub system directly. It
//! publishes through [`MiddlewareBus`], implemented by:
//!
//! - [`LocalBus`] – in-process `tokio::broadcast` fan-out, used when the
//!   robot stack runs in the same process and in tests.
//! - [`RosbridgeBus`] – rosbridge v2 JSON protocol over a WebSocket client.

pub mod local;
pub mod rosbridge;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BridgeConfig, BusEndpoint};
use crate::domain::DrivePayload;
use crate::error::PublishError;

pub use local::{BusMessage, LocalBus};
pub use rosbridge::RosbridgeBus;

/// Publish primitive of the robot middleware.
#[async_trait]
pub trait MiddlewareBus: Send + Sync + std::fmt::Debug {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::BusUnavailable`] if the bus cannot accept
    /// the message.
    async fn publish(&self, topic: &str, payload: &DrivePayload) -> Result<(), PublishError>;
}

/// Builds the bus selected by `BUS_ENDPOINT`.
#[must_use]
pub fn from_config(config: &BridgeConfig) -> Arc<dyn MiddlewareBus> {
    match &config.bus_endpoint {
        BusEndpoint::Local => Arc::new(LocalBus::new(config.local_bus_capacity)),
        BusEndpoint::Rosbridge(url) => Arc::new(RosbridgeBus::new(
            url.clone(),
            config.bus_message_type.clone(),
        )),
    }
}
