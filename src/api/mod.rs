//! REST API layer: read-only session listing, eviction, health.
//!
//! Resource endpoints are mounted under `/api/v1`; system endpoints at the
//! root.

pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "teleop-gateway", description = "Teleoperation bridge REST surface"),
    paths(
        handlers::system::health_handler,
        handlers::robots::list_sessions,
        handlers::robots::evict_session,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        crate::domain::SessionInfo,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    ))
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
