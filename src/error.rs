//! Unified error handling for the donation backend
//!
//! Every failure that can reach a handler is expressed as an [`AppError`],
//! which carries the HTTP status, a machine-readable [`ErrorCode`] and a
//! localized message that is safe to show to the payer. Internal causes stay
//! in the error for logging and are never rendered to the client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling on the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "MISSING_FIELD")]
    MissingField,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "INVALID_CPF")]
    InvalidCpf,
    #[serde(rename = "INVALID_EMAIL")]
    InvalidEmail,
    #[serde(rename = "INVALID_PHONE")]
    InvalidPhone,
    #[serde(rename = "INVALID_PAYMENT_METHOD")]
    InvalidPaymentMethod,
    #[serde(rename = "CARD_DATA_REQUIRED")]
    CardDataRequired,
    #[serde(rename = "CONFIRMATION_REQUIRED")]
    ConfirmationRequired,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "GATEWAY_TIMEOUT")]
    GatewayTimeout,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Input validation errors (400, user-correctable)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field missing or empty
    MissingField { field: String },
    /// Customer object absent or not an object
    MissingCustomer,
    /// Amount not a positive number with at most two decimals
    InvalidAmount { amount: String, reason: String },
    InvalidCpf,
    InvalidEmail,
    InvalidPhone,
    InvalidPaymentMethod { method: String },
    /// Credit card payment without token or payment method id
    CardDataRequired,
    /// Destructive admin action without explicit confirmation
    ConfirmationRequired { action: String },
    /// Malformed query/body value
    InvalidField { field: String, reason: String },
}

/// Domain errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    NotFound { entity: String, id: String },
    Unauthorized,
}

/// Infrastructure-level errors (store, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// External service errors (payment gateway)
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentGateway {
        gateway: String,
        message: String,
        is_retryable: bool,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Validation(ValidationError),
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::validation(ValidationError::MissingField {
            field: field.into(),
        })
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, AppErrorKind::Validation(_))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::Unauthorized => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(_) => 500,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { .. } | ValidationError::MissingCustomer => {
                    ErrorCode::MissingField
                }
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                ValidationError::InvalidCpf => ErrorCode::InvalidCpf,
                ValidationError::InvalidEmail => ErrorCode::InvalidEmail,
                ValidationError::InvalidPhone => ErrorCode::InvalidPhone,
                ValidationError::InvalidPaymentMethod { .. } => ErrorCode::InvalidPaymentMethod,
                ValidationError::CardDataRequired => ErrorCode::CardDataRequired,
                ValidationError::ConfirmationRequired { .. } => ErrorCode::ConfirmationRequired,
                ValidationError::InvalidField { .. } => ErrorCode::ValidationError,
            },
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::Unauthorized => ErrorCode::Unauthorized,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::Timeout { .. } => ErrorCode::GatewayTimeout,
            },
        }
    }

    /// Localized message that is safe to show to the payer
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Campo obrigatório ausente: {}", field)
                }
                ValidationError::MissingCustomer => "Dados do cliente são obrigatórios".to_string(),
                ValidationError::InvalidAmount { reason, .. } => reason.clone(),
                ValidationError::InvalidCpf => {
                    "CPF inválido. Por favor, verifique o número digitado.".to_string()
                }
                ValidationError::InvalidEmail => {
                    "Email inválido. Por favor, verifique o endereço digitado.".to_string()
                }
                ValidationError::InvalidPhone => {
                    "Telefone inválido. Deve conter 10 ou 11 dígitos.".to_string()
                }
                ValidationError::InvalidPaymentMethod { .. } => {
                    "Método de pagamento inválido".to_string()
                }
                ValidationError::CardDataRequired => {
                    "Dados do cartão são obrigatórios para pagamento via crédito".to_string()
                }
                ValidationError::ConfirmationRequired { action } => {
                    format!("Confirmação explícita é necessária para: {}", action)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Campo inválido: {} ({})", field, reason)
                }
            },
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { entity, .. } => format!("{} não encontrado", entity),
                DomainError::Unauthorized => "Acesso não autorizado".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Serviço temporariamente indisponível. Tente novamente em instantes.".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => {
                    if *is_retryable {
                        "O serviço de pagamento está temporariamente indisponível. Tente novamente."
                            .to_string()
                    } else {
                        "Não foi possível processar o pagamento. Verifique os dados e tente novamente."
                            .to_string()
                    }
                }
                ExternalError::Timeout { .. } => {
                    "O serviço de pagamento demorou para responder. Tente novamente.".to_string()
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Validation(_) | AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.user_message(), context),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

// From<DatabaseError> lives in database/error.rs, From<GatewayError> in payments/error.rs

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
