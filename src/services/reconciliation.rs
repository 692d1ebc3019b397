//! Payment status reconciliation
//!
//! Brings the stored donation in line with what the gateway reports. Only
//! terminal statuses are ever written, and a donation that already reached a
//! terminal status is never moved again.

use crate::database::error::DatabaseError;
use crate::database::repository::DonationStore;
use crate::error::AppError;
use crate::middleware::logging::log_external_call;
use crate::payments::error::GatewayError;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{DonationStatus, GatewayPayment};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("gateway lookup failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store update failed: {0}")]
    Store(#[from] DatabaseError),
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        match err {
            ReconciliationError::Gateway(e) => e.into(),
            ReconciliationError::Store(e) => e.into(),
        }
    }
}

/// What happened to the stored donation after a reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The stored status was moved to the observed terminal status.
    Updated,
    /// The stored status already matched.
    AlreadyCurrent,
    /// The stored donation is terminal with a different status; left alone.
    Frozen { current: DonationStatus },
    /// No donation with this gateway id is stored.
    NotTracked,
    /// The observed status is `pending`; nothing to write.
    NotTerminal,
}

/// Result of a status check against the gateway.
#[derive(Debug, Clone)]
pub struct StatusCheck {
    pub payment: GatewayPayment,
    pub status: DonationStatus,
    /// `None` when the store could not be updated; the failure is logged.
    pub update: Option<StatusUpdate>,
}

pub struct ReconciliationService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn DonationStore>,
}

impl ReconciliationService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn DonationStore>) -> Self {
        Self { gateway, store }
    }

    pub fn gateway_name(&self) -> &'static str {
        self.gateway.name()
    }

    /// Ask the gateway for the payment without touching the store.
    pub async fn fetch(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        log_external_call(
            self.gateway.name(),
            "get_payment",
            self.gateway.get_payment(payment_id),
        )
        .await
    }

    /// Stored status of the donation, `None` when it is not tracked.
    pub async fn stored_status(
        &self,
        payment_id: &str,
    ) -> Result<Option<DonationStatus>, DatabaseError> {
        Ok(self
            .store
            .find_by_gateway_id(payment_id)
            .await?
            .map(|record| record.status))
    }

    /// Look the payment up and persist its status when it is terminal.
    ///
    /// Gateway failures are returned. Store failures are logged and reported
    /// as `update: None`; the gateway answer is still returned so the payer
    /// sees the current state.
    pub async fn check_status(&self, payment_id: &str) -> Result<StatusCheck, ReconciliationError> {
        let payment = self.fetch(payment_id).await?;
        let status = payment.donation_status();

        debug!(
            payment_id = %payment_id,
            gateway = self.gateway.name(),
            gateway_status = %payment.status,
            status = %status,
            "payment status fetched"
        );

        let update = match self.apply_status(payment_id, status).await {
            Ok(update) => Some(update),
            Err(e) => {
                warn!(
                    payment_id = %payment_id,
                    status = %status,
                    error = %e,
                    "could not persist reconciled status"
                );
                None
            }
        };

        Ok(StatusCheck {
            payment,
            status,
            update,
        })
    }

    /// Write `status` for the stored donation if the lifecycle allows it.
    pub async fn apply_status(
        &self,
        payment_id: &str,
        status: DonationStatus,
    ) -> Result<StatusUpdate, ReconciliationError> {
        if !status.is_terminal() {
            return Ok(StatusUpdate::NotTerminal);
        }

        let Some(existing) = self.store.find_by_gateway_id(payment_id).await? else {
            warn!(
                payment_id = %payment_id,
                status = %status,
                "gateway reported a payment with no stored donation"
            );
            return Ok(StatusUpdate::NotTracked);
        };

        if existing.status == status {
            return Ok(StatusUpdate::AlreadyCurrent);
        }

        if !existing.status.can_transition_to(status) {
            warn!(
                payment_id = %payment_id,
                current = %existing.status,
                observed = %status,
                "ignoring status change on a settled donation"
            );
            return Ok(StatusUpdate::Frozen {
                current: existing.status,
            });
        }

        match self.store.update_status(payment_id, status).await? {
            Some(_) => {
                info!(
                    payment_id = %payment_id,
                    from = %existing.status,
                    to = %status,
                    "donation status reconciled"
                );
                Ok(StatusUpdate::Updated)
            }
            // Settled by a concurrent check, or deleted, since the lookup.
            None => match self.store.find_by_gateway_id(payment_id).await? {
                Some(current) if current.status == status => Ok(StatusUpdate::AlreadyCurrent),
                Some(current) => {
                    warn!(
                        payment_id = %payment_id,
                        current = %current.status,
                        observed = %status,
                        "donation settled concurrently, keeping stored status"
                    );
                    Ok(StatusUpdate::Frozen {
                        current: current.status,
                    })
                }
                None => Ok(StatusUpdate::NotTracked),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDonationStore;
    use crate::database::repository::{DonationRecord, NewDonation};
    use crate::payments::types::{
        CreatePaymentRequest, Payer, PaymentMethod, WebhookNotification, WebhookRequest,
    };
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, Utc};

    /// Reports every payment with a fixed gateway status.
    struct FixedStatusGateway(&'static str);

    #[async_trait]
    impl PaymentGateway for FixedStatusGateway {
        async fn create_payment(
            &self,
            _request: CreatePaymentRequest,
        ) -> Result<GatewayPayment, GatewayError> {
            Err(GatewayError::provider("fixed", "not supported"))
        }

        async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
            if payment_id == "unreachable" {
                return Err(GatewayError::Network {
                    message: "connection reset".to_string(),
                });
            }
            Ok(GatewayPayment {
                id: payment_id.to_string(),
                status: self.0.to_string(),
                status_detail: None,
                reference_id: None,
                qr_code: None,
                raw: serde_json::Value::Null,
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }

        fn verify_webhook(
            &self,
            _request: &WebhookRequest,
        ) -> Result<WebhookNotification, GatewayError> {
            Err(GatewayError::WebhookVerification {
                message: "not supported".to_string(),
            })
        }
    }

    async fn store_with(gateway_id: &str, status: DonationStatus) -> Arc<MemoryDonationStore> {
        let store = Arc::new(MemoryDonationStore::new());
        store
            .insert(NewDonation {
                amount: BigDecimal::from(100),
                donation_type: "Dízimo".to_string(),
                church_location: "sede".to_string(),
                payment_method: PaymentMethod::Pix,
                status,
                payer: Payer {
                    name: "João Teste".to_string(),
                    email: "joao@example.com".to_string(),
                    cpf: "12345678909".to_string(),
                    phone: "11999999999".to_string(),
                },
                gateway_payment_id: gateway_id.to_string(),
                gateway_reference_id: None,
            })
            .await
            .unwrap();
        store
    }

    fn service(status: &'static str, store: Arc<MemoryDonationStore>) -> ReconciliationService {
        ReconciliationService::new(Arc::new(FixedStatusGateway(status)), store)
    }

    #[tokio::test]
    async fn approved_payment_marks_donation_paid() {
        let store = store_with("42", DonationStatus::Pending).await;
        let check = service("approved", store.clone())
            .check_status("42")
            .await
            .unwrap();

        assert_eq!(check.status, DonationStatus::Paid);
        assert_eq!(check.update, Some(StatusUpdate::Updated));
        let stored = store.find_by_gateway_id("42").await.unwrap().unwrap();
        assert_eq!(stored.status, DonationStatus::Paid);
    }

    #[tokio::test]
    async fn second_check_is_a_no_op() {
        let store = store_with("42", DonationStatus::Pending).await;
        let service = service("approved", store.clone());

        service.check_status("42").await.unwrap();
        let again = service.check_status("42").await.unwrap();
        assert_eq!(again.update, Some(StatusUpdate::AlreadyCurrent));
    }

    #[tokio::test]
    async fn pending_report_writes_nothing() {
        let store = store_with("42", DonationStatus::Pending).await;
        let check = service("in_process", store.clone())
            .check_status("42")
            .await
            .unwrap();

        assert_eq!(check.status, DonationStatus::Pending);
        assert_eq!(check.update, Some(StatusUpdate::NotTerminal));
    }

    #[tokio::test]
    async fn settled_donation_is_not_overwritten() {
        let store = store_with("42", DonationStatus::Paid).await;
        let check = service("cancelled", store.clone())
            .check_status("42")
            .await
            .unwrap();

        assert_eq!(
            check.update,
            Some(StatusUpdate::Frozen {
                current: DonationStatus::Paid
            })
        );
        let stored = store.find_by_gateway_id("42").await.unwrap().unwrap();
        assert_eq!(stored.status, DonationStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_payment_is_reported_not_tracked() {
        let store = Arc::new(MemoryDonationStore::new());
        let check = service("approved", store).check_status("404").await.unwrap();
        assert_eq!(check.update, Some(StatusUpdate::NotTracked));
    }

    #[tokio::test]
    async fn store_failure_still_returns_gateway_status() {
        let store = store_with("42", DonationStatus::Pending).await;
        store.set_fail_writes(true);

        let check = service("approved", store).check_status("42").await.unwrap();
        assert_eq!(check.status, DonationStatus::Paid);
        assert!(check.update.is_none());
    }

    /// Holds every lookup result back so concurrent checks read before either writes.
    struct SlowReads(Arc<MemoryDonationStore>);

    #[async_trait]
    impl DonationStore for SlowReads {
        async fn insert(&self, donation: NewDonation) -> Result<DonationRecord, DatabaseError> {
            self.0.insert(donation).await
        }

        async fn update_status(
            &self,
            gateway_payment_id: &str,
            status: DonationStatus,
        ) -> Result<Option<DonationRecord>, DatabaseError> {
            self.0.update_status(gateway_payment_id, status).await
        }

        async fn find_by_gateway_id(
            &self,
            gateway_payment_id: &str,
        ) -> Result<Option<DonationRecord>, DatabaseError> {
            let found = self.0.find_by_gateway_id(gateway_payment_id).await;
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            found
        }

        async fn find_by_payer_cpf(&self, cpf: &str) -> Result<Vec<DonationRecord>, DatabaseError> {
            self.0.find_by_payer_cpf(cpf).await
        }

        async fn latest_by_cpf(&self, cpf: &str) -> Result<Option<DonationRecord>, DatabaseError> {
            self.0.latest_by_cpf(cpf).await
        }

        async fn list_between(
            &self,
            start: Option<DateTime<Utc>>,
            end: Option<DateTime<Utc>>,
        ) -> Result<Vec<DonationRecord>, DatabaseError> {
            self.0.list_between(start, end).await
        }

        async fn delete_by_status(&self, statuses: &[&str]) -> Result<u64, DatabaseError> {
            self.0.delete_by_status(statuses).await
        }

        async fn ping(&self) -> Result<(), DatabaseError> {
            self.0.ping().await
        }
    }

    #[tokio::test]
    async fn concurrent_terminal_reports_settle_once() {
        let memory = store_with("42", DonationStatus::Pending).await;
        let slow: Arc<dyn DonationStore> = Arc::new(SlowReads(memory.clone()));
        let approve =
            ReconciliationService::new(Arc::new(FixedStatusGateway("approved")), slow.clone());
        let cancel = ReconciliationService::new(Arc::new(FixedStatusGateway("cancelled")), slow);

        let (paid, canceled) = tokio::join!(approve.check_status("42"), cancel.check_status("42"));
        let paid = paid.unwrap().update.unwrap();
        let canceled = canceled.unwrap().update.unwrap();

        let stored = memory.find_by_gateway_id("42").await.unwrap().unwrap().status;
        match (paid, canceled) {
            (StatusUpdate::Updated, StatusUpdate::Frozen { current }) => {
                assert_eq!(current, DonationStatus::Paid);
                assert_eq!(stored, DonationStatus::Paid);
            }
            (StatusUpdate::Frozen { current }, StatusUpdate::Updated) => {
                assert_eq!(current, DonationStatus::Canceled);
                assert_eq!(stored, DonationStatus::Canceled);
            }
            other => panic!("expected exactly one write, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn gateway_failure_is_returned() {
        let store = Arc::new(MemoryDonationStore::new());
        let err = service("approved", store)
            .check_status("unreachable")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconciliationError::Gateway(_)));

        let app: AppError = err.into();
        assert_eq!(app.status_code(), 500);
    }
}
