//! Error taxonomy of the bridge.
//!
//! | Type               | Scope          | Consequence                                  |
//! |--------------------|----------------|----------------------------------------------|
//! | [`AdmissionError`] | handshake      | session never created, HTTP error response   |
//! | [`DecodeError`]    | one frame      | frame dropped, `rejected` status, continue   |
//! | [`PublishError`]   | bus            | fail-safe stop attempted, session torn down  |
//! | [`ConfigError`]    | startup        | process refuses to start                     |
//! | [`GatewayError`]   | REST endpoints | JSON error response                          |
//!
//! A watchdog timeout is not an error; it is a
//! [`CloseReason`](crate::bridge::CloseReason) that drives teardown.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::RobotId;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "robot r1 already has a controlling session"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

fn error_response(status: StatusCode, code: u32, message: String) -> Response {
    let body = ErrorResponse {
        error: ErrorBody { code, message },
    };
    (status, axum::Json(body)).into_response()
}

/// Handshake/admission failure. The session is never created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// Another session already holds the robot.
    #[error("robot {0} already has a controlling session")]
    RobotBusy(RobotId),

    /// Missing or unknown operator token.
    #[error("unauthorized operator")]
    Unauthorized,

    /// Handshake parameters missing or malformed.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),

    /// The gateway is draining sessions before exit.
    #[error("gateway is shutting down")]
    ShuttingDown,
}

impl AdmissionError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MalformedHandshake(_) => 1001,
            Self::Unauthorized => 1401,
            Self::RobotBusy(_) => 2001,
            Self::ShuttingDown => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedHandshake(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RobotBusy(_) => StatusCode::CONFLICT,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.error_code(), self.to_string())
    }
}

/// Per-frame decode failure. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Not UTF-8, not a JSON object, or a field of the wrong type.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A component exceeds the tolerance band.
    #[error("`{field}` = {value} is outside the accepted range")]
    OutOfRange {
        /// Offending field.
        field: &'static str,
        /// Received value.
        value: f64,
    },

    /// Sequence number does not exceed the last accepted one.
    #[error("stale sequence {seq} (last accepted {last})")]
    StaleSequence {
        /// Received sequence number.
        seq: u64,
        /// Last accepted sequence number.
        last: u64,
    },
}

/// Middleware bus failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The bus could not be reached or refused the message.
    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    /// The payload could not be serialized for the bus.
    #[error("payload encoding failed: {0}")]
    Encoding(String),
}

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// REST endpoint errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No session holds the given robot.
    #[error("no session for robot {0}")]
    SessionNotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::SessionNotFound(_) => 2002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.error_code(), self.to_string())
    }
}
