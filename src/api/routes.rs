//! Route definitions for the API.

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    // Build OpenAPI spec once at startup
    let openapi = super::openapi::build_openapi();

    let espocrm_routes = handlers::espocrm::router()
        .nest("/webhook", handlers::webhook::router());

    Router::new()
        // Health endpoint (no auth required)
        .route("/health", get(handlers::health::health_check))
        // OpenAPI spec and Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", openapi))
        // EspoCRM bridge routes
        .nest("/api/espocrm", espocrm_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
