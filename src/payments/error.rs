use serde_json::Value as JsonValue;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// The gateway answered with an error; `payload` keeps its raw body for the logs.
    #[error("Gateway error: gateway={gateway}, status={status:?}, message={message}")]
    Provider {
        gateway: String,
        message: String,
        status: Option<u16>,
        payload: Option<JsonValue>,
        retryable: bool,
    },

    #[error("Invalid gateway response: gateway={gateway}, message={message}")]
    InvalidResponse { gateway: String, message: String },

    #[error("Webhook verification failed: {message}")]
    WebhookVerification { message: String },

    #[error("Gateway not configured: {message}")]
    NotConfigured { message: String },
}

impl GatewayError {
    pub fn provider(gateway: &str, message: impl Into<String>) -> Self {
        GatewayError::Provider {
            gateway: gateway.to_string(),
            message: message.into(),
            status: None,
            payload: None,
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Validation { .. } => false,
            GatewayError::Network { .. } => true,
            GatewayError::RateLimited { .. } => true,
            GatewayError::Provider { retryable, .. } => *retryable,
            GatewayError::InvalidResponse { .. } => false,
            GatewayError::WebhookVerification { .. } => false,
            GatewayError::NotConfigured { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            GatewayError::Validation { .. } => 400,
            GatewayError::WebhookVerification { .. } => 401,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::Network { .. }
            | GatewayError::Provider { .. }
            | GatewayError::InvalidResponse { .. }
            | GatewayError::NotConfigured { .. } => 500,
        }
    }

    /// Gateway-side status the failure was reported with, if any
    pub fn gateway_status(&self) -> Option<u16> {
        match self {
            GatewayError::Provider { status, .. } => *status,
            GatewayError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.gateway_status() == Some(404)
    }
}

impl From<GatewayError> for crate::error::AppError {
    fn from(err: GatewayError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match &err {
            GatewayError::Validation { message, field } => {
                AppError::validation(ValidationError::InvalidField {
                    field: field.clone().unwrap_or_else(|| "request".to_string()),
                    reason: message.clone(),
                })
            }
            GatewayError::Provider { gateway, .. } | GatewayError::InvalidResponse { gateway, .. } => {
                AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                    gateway: gateway.clone(),
                    message: err.to_string(),
                    is_retryable: err.is_retryable(),
                }))
            }
            _ => AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                gateway: "gateway".to_string(),
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            })),
        }
    }
}
