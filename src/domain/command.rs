//! Control commands flowing from the operator to the bus.
//!
//! A [`ControlCommand`] is what the codec produces from one inbound frame.
//! A [`DrivePayload`] is what actually goes on the wire to the robot; the
//! fail-safe stop is simply [`DrivePayload::STOP`].

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lower bound of a published command component.
pub const COMPONENT_MIN: f64 = -1.0;
/// Upper bound of a published command component.
pub const COMPONENT_MAX: f64 = 1.0;

/// A decoded, range-checked operator command.
///
/// Immutable once constructed. Components are already clamped to
/// `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    forward_back: f64,
    left_right: f64,
    sequence_no: u64,
    received_at: Instant,
}

impl ControlCommand {
    /// Builds a command, clamping both components into `[-1.0, 1.0]`.
    #[must_use]
    pub fn new(forward_back: f64, left_right: f64, sequence_no: u64, received_at: Instant) -> Self {
        Self {
            forward_back: forward_back.clamp(COMPONENT_MIN, COMPONENT_MAX),
            left_right: left_right.clamp(COMPONENT_MIN, COMPONENT_MAX),
            sequence_no,
            received_at,
        }
    }

    /// Longitudinal axis, positive is forward.
    #[must_use]
    pub const fn forward_back(&self) -> f64 {
        self.forward_back
    }

    /// Lateral / turning axis, positive is right.
    #[must_use]
    pub const fn left_right(&self) -> f64 {
        self.left_right
    }

    /// Per-session sequence number of the frame this came from.
    #[must_use]
    pub const fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// Monotonic instant the frame was received.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Returns the bus payload for this command.
    #[must_use]
    pub const fn payload(&self) -> DrivePayload {
        DrivePayload {
            forward_back: self.forward_back,
            left_right: self.left_right,
        }
    }
}

/// Body published on a robot's `cmd_vel` topic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrivePayload {
    /// Longitudinal axis in `[-1.0, 1.0]`.
    pub forward_back: f64,
    /// Lateral axis in `[-1.0, 1.0]`.
    pub left_right: f64,
}

impl DrivePayload {
    /// The fail-safe stop.
    pub const STOP: Self = Self {
        forward_back: 0.0,
        left_right: 0.0,
    };

    /// Returns `true` if this is the zero command.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.forward_back == 0.0 && self.left_right == 0.0
    }
}
