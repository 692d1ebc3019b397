//! Error response formatting
//!
//! Every failure leaves the service as the same JSON shape: the localized
//! message under `error`, a machine-readable `code`, the request id and a
//! timestamp. Internal causes are logged here and never serialized.

use crate::error::{AppError, AppErrorKind, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable, localized message
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.user_message(),
            code: error.error_code(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }

    /// Generic 500 body for failures that have no better description
    pub fn internal_error(request_id: Option<String>) -> Self {
        Self {
            error: "Erro interno".to_string(),
            code: ErrorCode::InternalError,
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(false),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let cause = internal_cause(&self);
        if status_code.is_server_error() {
            tracing::error!(
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                cause = %cause,
                context = ?self.context,
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                code = ?self.error_code(),
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                context = ?self.context,
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Log-only description of what actually went wrong
fn internal_cause(error: &AppError) -> String {
    use crate::error::{ExternalError, InfrastructureError};

    match &error.kind {
        AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. }) => {
            message.clone()
        }
        AppErrorKind::Infrastructure(InfrastructureError::Configuration { message }) => {
            message.clone()
        }
        AppErrorKind::External(ExternalError::PaymentGateway {
            gateway, message, ..
        }) => format!("{}: {}", gateway, message),
        AppErrorKind::External(ExternalError::Timeout {
            service,
            timeout_secs,
        }) => format!("{} timed out after {}s", service, timeout_secs),
        _ => error.user_message(),
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
