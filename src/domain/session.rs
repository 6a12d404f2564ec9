//! Per-connection session state machine.
//!
//! ```text
//! Connected ──first valid command──▶ Active
//!     │                                 │
//!     └─────────────┬───────────────────┘
//!                   ▼  disconnect / watchdog / eviction / bus failure
//!                Closing ──stop published, transport closed──▶ Disconnected
//! ```

use serde::Serialize;
use tokio::time::Instant;

use super::{ControlCommand, RobotId, SessionId};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Admitted, no valid command received yet.
    Connected,
    /// Forwarding operator commands to the robot.
    Active,
    /// Tearing down: fail-safe stop is being published.
    Closing,
    /// Terminal.
    Disconnected,
}

impl SessionState {
    /// Returns `true` if the state machine allows `self → next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connected, Self::Active)
                | (Self::Connected | Self::Active, Self::Closing)
                | (Self::Closing, Self::Disconnected)
        )
    }
}

/// Returned when a state change is not part of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State the session was in.
    pub from: SessionState,
    /// Requested state.
    pub to: SessionState,
}

/// One operator-to-robot control relationship.
///
/// Owned by the session loop in [`crate::bridge::SessionManager`]; the
/// shared registry only sees snapshots of its state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    robot_id: RobotId,
    state: SessionState,
    last_valid_command_at: Option<Instant>,
    last_seq: Option<u64>,
    consecutive_decode_errors: u32,
}

impl Session {
    /// Creates a session in [`SessionState::Connected`].
    #[must_use]
    pub fn new(id: SessionId, robot_id: RobotId) -> Self {
        Self {
            id,
            robot_id,
            state: SessionState::Connected,
            last_valid_command_at: None,
            last_seq: None,
            consecutive_decode_errors: 0,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Robot this session controls.
    #[must_use]
    pub const fn robot_id(&self) -> &RobotId {
        &self.robot_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Sequence number of the last accepted command.
    #[must_use]
    pub const fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Instant the last accepted command was received.
    #[must_use]
    pub const fn last_valid_command_at(&self) -> Option<Instant> {
        self.last_valid_command_at
    }

    /// Number of decode failures since the last accepted command.
    #[must_use]
    pub const fn consecutive_decode_errors(&self) -> u32 {
        self.consecutive_decode_errors
    }

    /// Moves the session to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the lifecycle does not allow it;
    /// the state is left unchanged.
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Records an accepted command. Returns `true` if this was the first
    /// one and the session just became [`SessionState::Active`].
    ///
    /// The codec has already rejected stale sequence numbers.
    pub fn record_command(&mut self, command: &ControlCommand) -> bool {
        self.last_seq = Some(command.sequence_no());
        self.last_valid_command_at = Some(command.received_at());
        self.consecutive_decode_errors = 0;
        if self.state == SessionState::Connected {
            self.state = SessionState::Active;
            return true;
        }
        false
    }

    /// Counts a rejected frame and returns the running total.
    pub fn record_decode_error(&mut self) -> u32 {
        self.consecutive_decode_errors = self.consecutive_decode_errors.saturating_add(1);
        self.consecutive_decode_errors
    }
}
