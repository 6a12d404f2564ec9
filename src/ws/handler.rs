//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use super::Handshake;
use crate::app_state::AppState;

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    /// Target robot.
    pub robot_id: Option<String>,
    /// Operator token; the `Authorization` header is used when absent.
    pub token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

/// `GET /ws` — Admit the operator, then upgrade to WebSocket.
///
/// Admission errors are returned as HTTP responses before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
) -> Response {
    let handshake = Handshake {
        robot_id: query.robot_id,
        token: query.token.or_else(|| bearer_token(&headers)),
    };

    let handle = match state.gateway.accept(&handshake) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(robot_id = ?handshake.robot_id, error = %e, "handshake rejected");
            return e.into_response();
        }
    };

    let gateway = Arc::clone(&state.gateway);
    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _ = gateway.serve(handle, socket).await;
        })
}
