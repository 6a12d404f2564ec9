//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::bridge::SessionManager;
use crate::ws::SocketHandler;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Admission and serving of operator sockets.
    pub gateway: Arc<dyn SocketHandler>,
    /// Session lifecycle owner, for the REST surface.
    pub sessions: Arc<SessionManager>,
}
