use crate::error::{AppError, AppErrorKind, DomainError};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{DonationStatus, WebhookRequest};
use crate::services::reconciliation::ReconciliationService;
use crate::workers::reconciliation_poller::PollerRegistry;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<WebhookProcessorError> for AppError {
    fn from(err: WebhookProcessorError) -> Self {
        match err {
            WebhookProcessorError::InvalidSignature(reason) => {
                AppError::new(AppErrorKind::Domain(DomainError::Unauthorized))
                    .with_context(reason)
            }
            WebhookProcessorError::UnknownProvider(name) => AppError::not_found("Gateway", name),
        }
    }
}

/// How an authenticated notification was handled. Every variant is
/// acknowledged to the gateway with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    Reconciled {
        payment_id: String,
        status: DonationStatus,
    },
    /// Not a payment event.
    Ignored { event_type: String },
    /// Reconciliation failed; logged, and the next poll or notification retries.
    Failed { payment_id: String },
}

pub struct WebhookProcessor {
    gateway: Arc<dyn PaymentGateway>,
    reconciler: Arc<ReconciliationService>,
    poller: Option<Arc<PollerRegistry>>,
}

impl WebhookProcessor {
    pub fn new(gateway: Arc<dyn PaymentGateway>, reconciler: Arc<ReconciliationService>) -> Self {
        Self {
            gateway,
            reconciler,
            poller: None,
        }
    }

    /// Stop the status watch of payments settled through a notification.
    pub fn with_poller(mut self, poller: Arc<PollerRegistry>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub async fn process_webhook(
        &self,
        provider_name: &str,
        request: &WebhookRequest,
    ) -> Result<WebhookAck, WebhookProcessorError> {
        if !provider_name.eq_ignore_ascii_case(self.gateway.name()) {
            warn!(provider = %provider_name, "webhook for a gateway that is not active");
            return Err(WebhookProcessorError::UnknownProvider(provider_name.to_string()));
        }

        let notification = self.gateway.verify_webhook(request).map_err(|e| {
            error!(provider = %provider_name, error = %e, "Invalid webhook signature");
            WebhookProcessorError::InvalidSignature(e.to_string())
        })?;

        if let Some(event_type) = &notification.event_type {
            if !is_payment_event(event_type) {
                info!(event_type = %event_type, "Ignoring non-payment webhook");
                return Ok(WebhookAck::Ignored {
                    event_type: event_type.clone(),
                });
            }
        }

        let payment_id = notification.payment_id;
        match self.reconciler.check_status(&payment_id).await {
            Ok(check) => {
                if check.status.is_terminal() {
                    if let Some(poller) = &self.poller {
                        poller.stop(&payment_id).await;
                    }
                }
                info!(
                    payment_id = %payment_id,
                    status = %check.status,
                    update = ?check.update,
                    "Webhook processed successfully"
                );
                Ok(WebhookAck::Reconciled {
                    payment_id,
                    status: check.status,
                })
            }
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Webhook processing failed");
                Ok(WebhookAck::Failed { payment_id })
            }
        }
    }
}

/// Mercado Pago sends `type: payment` or `action: payment.updated`.
fn is_payment_event(event_type: &str) -> bool {
    event_type == "payment" || event_type.starts_with("payment.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_events_are_recognised() {
        assert!(is_payment_event("payment"));
        assert!(is_payment_event("payment.updated"));
        assert!(!is_payment_event("merchant_order"));
        assert!(!is_payment_event("subscription_preapproval"));
    }

    #[test]
    fn errors_map_to_http_statuses() {
        let unauthorized: AppError =
            WebhookProcessorError::InvalidSignature("signature mismatch".to_string()).into();
        assert_eq!(unauthorized.status_code(), 401);

        let unknown: AppError = WebhookProcessorError::UnknownProvider("stripe".to_string()).into();
        assert_eq!(unknown.status_code(), 404);
    }
}
