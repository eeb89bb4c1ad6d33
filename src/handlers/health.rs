use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde_json::json;

use crate::db;
use crate::handlers::AppState;

/// Create the health router
pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness/readiness probe: reports database reachability
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "up",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "database": "down",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
    }
}
