use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::api::{parse_json_body, tag, AppState};
use crate::error::AppError;
use crate::services::donation_orchestrator::DonationResponse;

/// POST /api/donate
pub async fn donate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DonationResponse>, AppError> {
    let body = parse_json_body(&body).map_err(|e| tag(e, &headers))?;
    let outcome = state
        .orchestrator
        .donate(&body)
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(outcome.to_response()))
}

#[derive(Debug, Serialize)]
pub struct WatchResponse {
    pub payment_id: String,
    pub watching: bool,
}

/// POST /api/donations/{id}/watch
pub async fn start_watch(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Json<WatchResponse> {
    let started = state.poller.start(&payment_id).await;
    let watching = started || state.poller.is_watching(&payment_id).await;
    Json(WatchResponse {
        payment_id,
        watching,
    })
}

/// DELETE /api/donations/{id}/watch
pub async fn stop_watch(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Json<WatchResponse> {
    if state.poller.stop(&payment_id).await {
        info!(payment_id = %payment_id, "status watch released by client");
    }
    Json(WatchResponse {
        payment_id,
        watching: false,
    })
}
