//! WebSocket wire types.
//!
//! Inbound frames are parsed field-by-field by
//! [`CommandCodec`](crate::bridge::CommandCodec) so that a missing field
//! and a mistyped one are told apart. Outbound frames are [`StatusFrame`]s.

use serde::{Deserialize, Serialize};

/// Outbound status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Command accepted.
    Ok,
    /// Frame dropped; `reason` says why.
    Rejected,
    /// The bridge stopped the robot and is closing the session.
    Stopped,
}

/// Server → client acknowledgment / status frame.
///
/// ```json
/// { "status": "rejected", "reason": "stale sequence 3 (last accepted 5)" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    /// Outcome.
    pub status: Status,
    /// Human-readable detail, omitted for plain acks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusFrame {
    /// Plain acknowledgment.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            status: Status::Ok,
            reason: None,
        }
    }

    /// Rejection of one frame.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Rejected,
            reason: Some(reason.into()),
        }
    }

    /// Final frame before the bridge closes the session.
    #[must_use]
    pub fn stopped(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Stopped,
            reason: Some(reason.into()),
        }
    }
}
