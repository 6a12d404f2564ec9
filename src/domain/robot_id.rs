//! Validated robot identifier.
//!
//! [`RobotId`] is the key of the session registry and the only input to
//! the control topic name, so it is restricted to a conservative alphabet
//! that can be embedded in a bus topic without escaping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum accepted length of a robot identifier.
pub const MAX_ROBOT_ID_LEN: usize = 64;

/// Identifier of a controllable robot.
///
/// Non-empty, at most [`MAX_ROBOT_ID_LEN`] characters from
/// `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RobotId(String);

/// Returned when a string is not a valid [`RobotId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid robot id {0:?}")]
pub struct InvalidRobotId(pub String);

impl RobotId {
    /// Parses and validates a robot identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRobotId`] if `raw` is empty, too long, or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, InvalidRobotId> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_ROBOT_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidRobotId(raw.to_string()))
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the bus topic carrying velocity commands for this robot.
    #[must_use]
    pub fn cmd_vel_topic(&self) -> String {
        format!("/robots/{}/cmd_vel", self.0)
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RobotId {
    type Err = InvalidRobotId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RobotId {
    type Error = InvalidRobotId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RobotId> for String {
    fn from(id: RobotId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_ids() {
        for raw in ["r1", "rover_2", "arm-left", "A"] {
            assert!(RobotId::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_empty_and_unsafe_ids() {
        for raw in ["", "r/1", "r 1", "../etc", "r1?x=1", "ü"] {
            assert!(RobotId::parse(raw).is_err(), "{raw:?} should be invalid");
        }
    }

    #[test]
    fn rejects_overlong_id() {
        let raw = "a".repeat(MAX_ROBOT_ID_LEN + 1);
        assert!(RobotId::parse(&raw).is_err());
        let raw = "a".repeat(MAX_ROBOT_ID_LEN);
        assert!(RobotId::parse(&raw).is_ok());
    }

    #[test]
    fn topic_is_derived_from_id() {
        let Ok(id) = RobotId::parse("r1") else {
            panic!("valid id");
        };
        assert_eq!(id.cmd_vel_topic(), "/robots/r1/cmd_vel");
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: Result<RobotId, _> = serde_json::from_str("\"r1\"");
        assert!(ok.is_ok());
        let bad: Result<RobotId, _> = serde_json::from_str("\"r/1\"");
        assert!(bad.is_err());
    }
}
