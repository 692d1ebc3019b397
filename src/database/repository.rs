//! Storage seams for donations and receipts.
//!
//! Services depend on these traits only; Postgres and in-memory backends are
//! chosen at startup.

use crate::database::error::DatabaseError;
use crate::payments::types::{DonationStatus, Payer, PaymentMethod};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A persisted donation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonationRecord {
    pub id: Uuid,
    pub amount: BigDecimal,
    /// Free-text purpose label (tithe, offering, ...)
    pub donation_type: String,
    pub church_location: String,
    pub payment_method: String,
    pub status: DonationStatus,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_cpf: String,
    pub payer_phone: String,
    pub gateway_payment_id: String,
    pub gateway_reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a donation known once the gateway has accepted it.
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub amount: BigDecimal,
    pub donation_type: String,
    pub church_location: String,
    pub payment_method: PaymentMethod,
    pub status: DonationStatus,
    pub payer: Payer,
    pub gateway_payment_id: String,
    pub gateway_reference_id: Option<String>,
}

impl NewDonation {
    /// Materialize the record the store will hold, stamped now.
    pub fn into_record(self) -> DonationRecord {
        DonationRecord {
            id: Uuid::new_v4(),
            amount: self.amount,
            donation_type: self.donation_type,
            church_location: self.church_location,
            payment_method: self.payment_method.as_str().to_string(),
            status: self.status,
            payer_name: self.payer.name,
            payer_email: self.payer.email,
            payer_cpf: self.payer.cpf,
            payer_phone: self.payer.phone,
            gateway_payment_id: self.gateway_payment_id,
            gateway_reference_id: self.gateway_reference_id,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DonationStore: Send + Sync {
    /// Fails with a unique violation when the gateway id is already stored.
    async fn insert(&self, donation: NewDonation) -> Result<DonationRecord, DatabaseError>;

    /// Set the status of the donation with this gateway id, atomically and
    /// only while the stored status is pending or already equal to `status`.
    ///
    /// Returns `None` when no donation matched: either none is stored or it
    /// settled with a different status first.
    async fn update_status(
        &self,
        gateway_payment_id: &str,
        status: DonationStatus,
    ) -> Result<Option<DonationRecord>, DatabaseError>;

    async fn find_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<DonationRecord>, DatabaseError>;

    /// All donations of a payer, newest first. `cpf` is digits only.
    async fn find_by_payer_cpf(&self, cpf: &str) -> Result<Vec<DonationRecord>, DatabaseError>;

    /// Most recent donation of a payer.
    async fn latest_by_cpf(&self, cpf: &str) -> Result<Option<DonationRecord>, DatabaseError>;

    /// Donations created within the inclusive bounds, newest first.
    async fn list_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<DonationRecord>, DatabaseError>;

    /// Delete every donation whose stored status is in `statuses`.
    async fn delete_by_status(&self, statuses: &[&str]) -> Result<u64, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Storage path of the receipt published under `short_id`.
    async fn find_storage_path(&self, short_id: &str) -> Result<Option<String>, DatabaseError>;
}
