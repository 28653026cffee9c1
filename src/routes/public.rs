use crate::{ApiDoc, AppState};
use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

/// Public Router Module
///
/// Endpoints reachable without credentials. Nothing here reads or writes
/// restaurant data.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers; does not touch the database.
        .route("/health", get(|| async { "ok" }))
        // GET /api-docs/openapi.json
        // The generated OpenAPI document for every resource route.
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
}
