use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::AppState;

/// GET /
pub async fn root() -> &'static str {
    "Chama Church donations API"
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health_status = state.health_checker.check_health().await;
    let status_code = if health_status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(health_status))
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let health_status = state.health_checker.check_health().await;
    if health_status.is_healthy() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        )
    }
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}
