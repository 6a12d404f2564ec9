//! Connection admission.
//!
//! [`SocketHandler`] is the capability the HTTP layer needs from the
//! bridge: admit a handshake, then serve the upgraded socket. It is
//! implemented once, by [`ConnectionGateway`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::WebSocket;

use super::connection::run_connection;
use crate::bridge::{SessionHandle, SessionManager, SessionOutcome};
use crate::domain::RobotId;
use crate::error::AdmissionError;

/// Out-of-band handshake parameters carried by the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    /// Target robot, unvalidated.
    pub robot_id: Option<String>,
    /// Operator credential.
    pub token: Option<String>,
}

/// Admission and serving of operator connections.
#[async_trait]
pub trait SocketHandler: Send + Sync + std::fmt::Debug {
    /// Validates `handshake` and registers a `Connected` session.
    ///
    /// # Errors
    ///
    /// Returns an [`AdmissionError`] if the handshake is malformed, the
    /// token is not accepted, or the robot is busy.
    fn accept(&self, handshake: &Handshake) -> Result<SessionHandle, AdmissionError>;

    /// Runs an admitted session over `socket` until it is `Disconnected`.
    async fn serve(&self, handle: SessionHandle, socket: WebSocket) -> SessionOutcome;
}

/// Token-checking gateway in front of the [`SessionManager`].
#[derive(Debug)]
pub struct ConnectionGateway {
    sessions: Arc<SessionManager>,
    tokens: HashSet<String>,
}

impl ConnectionGateway {
    /// Creates a gateway accepting the given operator tokens.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, tokens: HashSet<String>) -> Self {
        if tokens.is_empty() {
            tracing::warn!("no operator tokens configured; every handshake will be refused");
        }
        Self { sessions, tokens }
    }

    /// Checks the handshake without touching the registry.
    fn validate(&self, handshake: &Handshake) -> Result<RobotId, AdmissionError> {
        let raw = handshake
            .robot_id
            .as_deref()
            .ok_or_else(|| AdmissionError::MalformedHandshake("missing robot_id".to_string()))?;
        let robot_id =
            RobotId::parse(raw).map_err(|e| AdmissionError::MalformedHandshake(e.to_string()))?;

        match handshake.token.as_deref() {
            Some(token) if self.tokens.contains(token) => Ok(robot_id),
            _ => Err(AdmissionError::Unauthorized),
        }
    }
}

#[async_trait]
impl SocketHandler for ConnectionGateway {
    fn accept(&self, handshake: &Handshake) -> Result<SessionHandle, AdmissionError> {
        let robot_id = self.validate(handshake)?;
        self.sessions.admit(robot_id)
    }

    async fn serve(&self, handle: SessionHandle, socket: WebSocket) -> SessionOutcome {
        run_connection(&self.sessions, handle, socket).await
    }
}
