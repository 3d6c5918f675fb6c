//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit, middleware as axum_middleware, routing::any, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main router.
///
/// Every path and method lands in the same handler, which cleans the path and
/// rejects unsupported methods after authentication.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", any(handlers::handle_object))
        .route("/{*path}", any(handlers::handle_object))
        // Apply middleware
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.body_limit()))
        .with_state(state)
}
