use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};

use crate::errors::ServiceError;
use crate::handlers::AppState;

/// Create the dashboard router
pub fn dashboard_router() -> Router<AppState> {
    Router::new().route("/summary", get(get_summary))
}

/// Aggregated overview of the catalog and recent ledger activity
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/summary",
    responses(
        (status = 200, description = "Dashboard summary returned", body = crate::services::dashboard::DashboardSummary),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn get_summary(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.dashboard.summary().await?;

    Ok((StatusCode::OK, Json(summary)))
}
