use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tracing::info;

use crate::api::{tag, AppState};
use crate::error::AppError;
use crate::payments::types::WebhookRequest;

/// POST /api/webhooks/{provider}
///
/// Every authenticated notification is acknowledged with 200, including the
/// ones whose reconciliation failed; the gateway would otherwise keep
/// retrying a payment the poller already covers.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JsonValue>, AppError> {
    info!(provider = %provider, bytes = body.len(), "Received webhook");

    let request = WebhookRequest {
        headers: headers.clone(),
        data_id: query.get("data.id").cloned(),
        payload: body.to_vec(),
    };

    let ack = state
        .webhooks
        .process_webhook(&provider, &request)
        .await
        .map_err(|e| tag(e.into(), &headers))?;

    info!(provider = %provider, ack = ?ack, "Webhook acknowledged");
    Ok(Json(json!({ "status": "ok" })))
}
