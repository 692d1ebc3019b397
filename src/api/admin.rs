//! Operator endpoints. Mounted behind the bearer-token guard.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::api::{parse_json_body, tag, AppState};
use crate::error::AppError;
use crate::services::admin_dashboard::{DashboardStats, DonationListParams, DonationPage};

/// GET /api/admin/donations
pub async fn list_donations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DonationListParams>,
) -> Result<Json<DonationPage>, AppError> {
    let page = state
        .dashboard
        .list(&params)
        .await
        .map_err(|e| tag(e, &headers))?;
    Ok(Json(page))
}

/// GET /api/admin/stats
pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = state
        .dashboard
        .stats(chrono::Utc::now())
        .await
        .map_err(|e| tag(e, &headers))?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

/// POST /api/admin/donations/cleanup
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CleanupResponse>, AppError> {
    let body = parse_json_body(&body).map_err(|e| tag(e, &headers))?;
    let status = body
        .get("status")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();
    let confirm = body
        .get("confirm")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    let deleted = state
        .dashboard
        .cleanup(status, confirm)
        .await
        .map_err(|e| tag(e, &headers))?;

    warn!(status = %status, deleted, "admin cleanup executed");
    Ok(Json(CleanupResponse { deleted }))
}
