//! Robot session endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::domain::{RobotId, SessionInfo};
use crate::error::{ErrorResponse, GatewayError};

/// `GET /robots` — List reserved robots and their sessions.
#[utoipa::path(
    get,
    path = "/api/v1/robots",
    tag = "Robots",
    summary = "List sessions",
    description = "Returns one entry per robot currently held by a session, ordered by robot id.",
    responses(
        (status = 200, description = "Session snapshot", body = Vec<SessionInfo>),
    )
)]
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sessions.registry().snapshot())
}

/// `DELETE /robots/{robot_id}/session` — Force the controlling session to
/// stop the robot and close.
///
/// # Errors
///
/// Returns [`GatewayError`] if the robot id is invalid or no session holds it.
#[utoipa::path(
    delete,
    path = "/api/v1/robots/{robot_id}/session",
    tag = "Robots",
    summary = "Evict session",
    description = "Signals the session holding the robot to publish a fail-safe stop and close. Returns before teardown completes.",
    params(
        ("robot_id" = String, Path, description = "Robot identifier"),
    ),
    responses(
        (status = 202, description = "Eviction signalled"),
        (status = 400, description = "Invalid robot id", body = ErrorResponse),
        (status = 404, description = "No session for robot", body = ErrorResponse),
    )
)]
pub async fn evict_session(
    State(state): State<AppState>,
    Path(robot_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let robot = RobotId::parse(&robot_id).map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    if !state.sessions.evict(&robot) {
        return Err(GatewayError::SessionNotFound(robot_id));
    }
    tracing::info!(robot_id = %robot, "session eviction requested");
    Ok(StatusCode::ACCEPTED)
}

/// Robot routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/robots", get(list_sessions))
        .route("/robots/{robot_id}/session", delete(evict_session))
}
