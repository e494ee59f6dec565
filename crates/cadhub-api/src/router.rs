//! Route definitions for the CadHub HTTP API.
//!
//! The router receives `AppState` and passes it to all handlers via Axum's
//! `State` extractor.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload =
        usize::try_from(state.config.server.max_upload_size_bytes).unwrap_or(usize::MAX);
    let cors = middleware::cors::build_cors_layer(&state.config.server.cors);

    Router::new()
        .merge(conversion_routes().layer(DefaultBodyLimit::max(max_upload)))
        .merge(status_routes())
        .merge(health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(middleware::logging::request_logging))
        .with_state(state)
}

/// Upload intake
fn conversion_routes() -> Router<AppState> {
    Router::new().route("/convert", post(handlers::convert::convert))
}

/// Status polling and result download
fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/status/{task_id}", get(handlers::status::get_status))
        .route("/download/{task_id}", get(handlers::status::download))
}

/// Welcome and health
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
}
