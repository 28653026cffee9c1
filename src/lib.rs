use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

// Route groups (public, authenticated, manager).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, manager, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and
/// `ToSchema` model. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::categories::list_categories, handlers::categories::get_category,
        handlers::categories::create_category, handlers::categories::update_category,
        handlers::categories::partial_update_category, handlers::categories::delete_category,
        handlers::menu_items::list_menu_items, handlers::menu_items::get_menu_item,
        handlers::menu_items::create_menu_item, handlers::menu_items::update_menu_item,
        handlers::menu_items::partial_update_menu_item, handlers::menu_items::delete_menu_item,
        handlers::cart::list_cart, handlers::cart::get_cart_line,
        handlers::cart::add_to_cart, handlers::cart::remove_from_cart,
        handlers::orders::list_orders, handlers::orders::get_order,
        handlers::orders::place_order, handlers::orders::update_order,
        handlers::orders::partial_update_order, handlers::orders::delete_order,
        handlers::users::assign_delivery_crew, handlers::users::manager_only,
    ),
    components(
        schemas(
            models::Role, models::User, models::Category, models::CategoryRequest,
            models::CategoryPatch, models::MenuItem, models::MenuItemRequest,
            models::MenuItemPatch, models::MenuItemPage, models::CartLine,
            models::CreateCartLineRequest, models::OrderStatus, models::OrderLine,
            models::Order, models::UpdateOrderRequest, models::ManagerMessage,
        )
    ),
    tags(
        (name = "little-lemon", description = "Little Lemon restaurant API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Everything a request can reach: the store and the configuration. Cloned
/// per request; both members are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` can be extracted, then keeps
/// the resolved identity in the request extensions so handlers reuse it.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the route groups, the authentication layer, and the
/// request-id/trace/CORS stack around them.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = authenticated::authenticated_routes()
        .merge(manager::manager_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let base_router = Router::new()
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span with method, URI and the `x-request-id` set by
/// `SetRequestIdLayer`, so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
