use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::api::{parse_json_body, tag, AppState};
use crate::error::AppError;
use crate::services::donor_lookup::{DonationHistory, DonorContact};

#[derive(Debug, Serialize)]
pub struct DonorResponse {
    pub found: bool,
    /// Same as `found`; older forms read this key.
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor: Option<DonorContact>,
}

fn cpf_field(body: &JsonValue) -> String {
    body.get("cpf")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

/// POST /api/check-donor
pub async fn check_donor(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DonorResponse>, AppError> {
    let body = parse_json_body(&body).map_err(|e| tag(e, &headers))?;
    let donor = state
        .donors
        .find_donor(&cpf_field(&body))
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(DonorResponse {
        found: donor.is_some(),
        exists: donor.is_some(),
        donor,
    }))
}

/// POST /api/history
pub async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DonationHistory>, AppError> {
    let body = parse_json_body(&body).map_err(|e| tag(e, &headers))?;
    let location = body
        .get("churchLocation")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let history = state
        .donors
        .history(&cpf_field(&body), location)
        .await
        .map_err(|e| tag(e, &headers))?;

    Ok(Json(history))
}
