//! Root and health check handlers.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{HealthResponse, WelcomeResponse};
use crate::state::AppState;

/// GET /
pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to the CAD Converter API!".to_string(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_ok = match state.broker.store.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "Job store health check failed");
            false
        }
    };
    let queue_depth = state.broker.queue.pending().await.ok();

    Json(HealthResponse {
        status: if store_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        broker: if store_ok { "connected" } else { "unavailable" }.to_string(),
        queue_depth,
        conversions: state.metrics.snapshot(),
    })
}
