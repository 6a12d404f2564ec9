//! Adapter from validated commands to the middleware publish call.
//!
//! One [`CommandPublisher`] exists per session and is bound to the
//! session's robot topic, so the bus channel for a robot has exactly one
//! writer at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::bus::MiddlewareBus;
use crate::domain::{ControlCommand, DrivePayload, RobotId};
use crate::error::PublishError;

/// Immediate fail-safe attempts before giving up. No delay between them.
pub const STOP_ATTEMPTS: u32 = 3;

/// Publishes commands for one robot.
#[derive(Debug)]
pub struct CommandPublisher {
    bus: Arc<dyn MiddlewareBus>,
    robot_id: RobotId,
    topic: String,
    publish_timeout: Option<Duration>,
    last_published: Option<DrivePayload>,
}

impl CommandPublisher {
    /// Binds a publisher to `robot_id`'s `cmd_vel` topic.
    #[must_use]
    pub fn new(bus: Arc<dyn MiddlewareBus>, robot_id: RobotId) -> Self {
        let topic = robot_id.cmd_vel_topic();
        Self {
            bus,
            robot_id,
            topic,
            publish_timeout: None,
            last_published: None,
        }
    }

    /// Bounds every bus call by `limit`; an expired call counts as
    /// [`PublishError::BusUnavailable`].
    #[must_use]
    pub const fn with_timeout(mut self, limit: Duration) -> Self {
        self.publish_timeout = Some(limit);
        self
    }

    async fn send(&self, payload: &DrivePayload) -> Result<(), PublishError> {
        let publish = self.bus.publish(&self.topic, payload);
        match self.publish_timeout {
            Some(limit) => tokio::time::timeout(limit, publish).await.map_err(|_| {
                PublishError::BusUnavailable(format!("publish timed out after {limit:?}"))
            })?,
            None => publish.await,
        }
    }

    /// Last payload the bus accepted for this robot.
    #[must_use]
    pub const fn last_published(&self) -> Option<DrivePayload> {
        self.last_published
    }

    /// Publishes an ordinary command.
    ///
    /// # Errors
    ///
    /// Returns the bus error. Before returning it, a fail-safe stop is
    /// attempted so the robot is not left running on the last command.
    pub async fn publish(&mut self, command: &ControlCommand) -> Result<(), PublishError> {
        let payload = command.payload();
        match self.send(&payload).await {
            Ok(()) => {
                self.last_published = Some(payload);
                tracing::trace!(
                    robot_id = %self.robot_id,
                    seq = command.sequence_no(),
                    "command published"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(robot_id = %self.robot_id, error = %e, "command publish failed");
                // Best effort; teardown retries the stop again anyway.
                let _ = self.publish_stop().await;
                Err(e)
            }
        }
    }

    /// Publishes the fail-safe stop, retrying immediately up to
    /// [`STOP_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns the last bus error if every attempt failed.
    pub async fn publish_stop(&mut self) -> Result<(), PublishError> {
        let mut attempt = 1;
        loop {
            match self.send(&DrivePayload::STOP).await {
                Ok(()) => {
                    self.last_published = Some(DrivePayload::STOP);
                    tracing::info!(robot_id = %self.robot_id, attempt, "fail-safe stop published");
                    return Ok(());
                }
                Err(e) if attempt < STOP_ATTEMPTS => {
                    tracing::warn!(robot_id = %self.robot_id, attempt, error = %e, "fail-safe stop failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(robot_id = %self.robot_id, attempt, error = %e, "fail-safe stop could not be published");
                    return Err(e);
                }
            }
        }
    }
}
