use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, warn};

use crate::api::AppState;

const NOT_FOUND_TEXT: &str = "Comprovante não encontrado";
const INTERNAL_TEXT: &str = "Erro interno";

/// GET /c/{short_id}
///
/// Short link printed on receipts. Answers in plain text since the
/// caller is a browser following a link, not the form's API client.
pub async fn redirect_to_receipt(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Response {
    let Some(base_url) = state.receipts_base_url.as_deref() else {
        error!("receipt link requested but RECEIPTS_PUBLIC_BASE_URL is not set");
        return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_TEXT).into_response();
    };

    match state.receipts.find_storage_path(&short_id).await {
        Ok(Some(path)) => Redirect::temporary(&receipt_url(base_url, &path)).into_response(),
        Ok(None) => {
            warn!(short_id = %short_id, "unknown receipt link");
            (StatusCode::NOT_FOUND, NOT_FOUND_TEXT).into_response()
        }
        Err(e) => {
            error!(short_id = %short_id, error = %e, "receipt lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_TEXT).into_response()
        }
    }
}

fn receipt_url(base_url: &str, storage_path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        storage_path.trim_start_matches('/')
    )
}
