//! Adapts an upgraded axum [`WebSocket`] to the session loop.
//!
//! Text and binary messages become [`TransportEvent::Frame`]s; a close
//! frame or read error becomes [`TransportEvent::Closed`]. Ping/pong is
//! left to axum. Outbound status strings are sent as text messages.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::bridge::{SessionHandle, SessionManager, SessionOutcome, TransportEvent};

/// Runs the session loop for a single WebSocket connection.
pub async fn run_connection(
    sessions: &SessionManager,
    handle: SessionHandle,
    socket: WebSocket,
) -> SessionOutcome {
    let session_id = handle.session_id();
    let (ws_tx, ws_rx) = socket.split();

    let inbound = ws_rx.filter_map(move |msg| async move {
        match msg {
            Ok(Message::Text(text)) => Some(TransportEvent::Frame(text.as_str().as_bytes().to_vec())),
            Ok(Message::Binary(bytes)) => Some(TransportEvent::Frame(bytes.to_vec())),
            Ok(Message::Close(_)) => Some(TransportEvent::Closed),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "ws read error");
                Some(TransportEvent::Closed)
            }
        }
    });
    let outbound =
        ws_tx.with(|text: String| async move { Ok::<_, axum::Error>(Message::text(text)) });

    let outcome = sessions.run(handle, inbound, outbound).await;
    tracing::debug!(%session_id, reason = %outcome.reason, "ws connection closed");
    outcome
}
