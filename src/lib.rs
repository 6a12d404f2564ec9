//! # teleop-gateway
//!
//! WebSocket teleoperation bridge. A remote operator streams joystick
//! commands over a WebSocket; the bridge validates them, rate-limits them
//! to a fixed frequency, and publishes them on the robot's `cmd_vel` topic
//! of a middleware bus. Whenever the link degrades or the operator leaves,
//! a zero command is published before the session goes away.
//!
//! ## Architecture
//!
//! ```text
//! Operator (WebSocket)          Admin (HTTP)
//!     │                             │
//!     ├── ConnectionGateway (ws/)   ├── REST Handlers (api/)
//!     │                             │
//!     ├── SessionManager (bridge/) ─┘
//!     │     ├── CommandCodec
//!     │     ├── RateLimiter
//!     │     ├── Watchdog
//!     │     └── CommandPublisher
//!     │
//!     ├── SessionRegistry (domain/)
//!     │
//!     └── MiddlewareBus (bus/): LocalBus | RosbridgeBus
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::bridge::SessionManager;
use crate::ws::handler::ws_handler;

/// Builds the application router: REST API plus `GET /ws`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wires gateway and session manager into an [`AppState`].
#[must_use]
pub fn build_state(config: &config::BridgeConfig, bus: Arc<dyn bus::MiddlewareBus>) -> AppState {
    let sessions = Arc::new(SessionManager::new(
        Arc::new(domain::SessionRegistry::new()),
        bus,
        bridge::SessionSettings::from_config(config),
    ));
    let gateway = Arc::new(ws::ConnectionGateway::new(
        Arc::clone(&sessions),
        config.operator_tokens.clone(),
    ));
    AppState { gateway, sessions }
}
