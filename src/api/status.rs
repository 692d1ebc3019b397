use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::api::{id_field, parse_json_body, tag, AppState};
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub id: String,
    /// Gateway-native status, e.g. `approved`
    pub status: String,
    pub status_detail: Option<String>,
}

/// POST /api/check-status
///
/// Accepts `{ id }` or the legacy `{ paymentId }`, as a string or a number.
pub async fn check_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let body = parse_json_body(&body).map_err(|e| tag(e, &headers))?;
    let payment_id = id_field(&body, &["id", "paymentId"])
        .ok_or_else(|| tag(AppError::missing_field("id"), &headers))?;

    let check = state
        .reconciler
        .check_status(&payment_id)
        .await
        .map_err(|e| tag(e.into(), &headers))?;

    if check.status.is_terminal() {
        state.poller.stop(&payment_id).await;
    }

    Ok(Json(StatusResponse {
        id: check.payment.id,
        status: check.payment.status,
        status_detail: check.payment.status_detail,
    }))
}
