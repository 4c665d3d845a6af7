//! API routes and handlers.

mod kv;

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};

use super::{error::ApiError, state::AppState};

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/kv", post(kv::add_value))
        .route(
            "/kv/{id}",
            get(kv::get_value)
                .put(kv::update_value)
                .delete(kv::delete_value),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Readiness check: the store must answer a ping.
async fn ready(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.repository().ping().await.map_err(|e| {
        tracing::warn!(error = %e, "store ping failed");
        ApiError::unavailable()
    })?;
    Ok("ok")
}
