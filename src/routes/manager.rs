use crate::{AppState, handlers::users};
use axum::{
    Router,
    routing::{get, post},
};

/// Manager Router Module
///
/// Routes that only managers may use. They sit behind the same authentication
/// layer as the resource routes; the Manager check itself runs in the handler.
pub fn manager_routes() -> Router<AppState> {
    Router::new()
        // POST /users/{id}/assign-to-delivery-crew
        // Grants the Delivery Crew role. Repeating it is harmless.
        .route(
            "/users/{id}/assign-to-delivery-crew",
            post(users::assign_delivery_crew),
        )
        // GET /manager-only
        .route("/manager-only", get(users::manager_only))
}
