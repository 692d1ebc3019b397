//! In-process stores for local runs (`SKIP_EXTERNALS=true`) and tests.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{DonationRecord, DonationStore, NewDonation, ReceiptStore};
use crate::payments::types::DonationStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryDonationStore {
    records: RwLock<Vec<DonationRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryDonationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert/update fail as if the database were down.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a fully formed record, e.g. one with a back-dated `created_at`.
    pub async fn insert_record(&self, record: DonationRecord) -> Result<(), DatabaseError> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|r| r.gateway_payment_id == record.gateway_payment_id)
        {
            return Err(duplicate());
        }
        records.push(record);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "memory store is refusing writes".to_string(),
            }));
        }
        Ok(())
    }

    /// Newest first; records created at the same instant keep reverse insertion order.
    async fn newest_first<F>(&self, keep: F) -> Vec<DonationRecord>
    where
        F: Fn(&DonationRecord) -> bool,
    {
        let records = self.records.read().await;
        let mut selected: Vec<DonationRecord> =
            records.iter().rev().filter(|r| keep(*r)).cloned().collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}

fn duplicate() -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: "donations_gateway_payment_id_key".to_string(),
    })
}

#[async_trait]
impl DonationStore for MemoryDonationStore {
    async fn insert(&self, donation: NewDonation) -> Result<DonationRecord, DatabaseError> {
        self.check_writable()?;
        let record = donation.into_record();
        self.insert_record(record.clone()).await?;
        Ok(record)
    }

    async fn update_status(
        &self,
        gateway_payment_id: &str,
        status: DonationStatus,
    ) -> Result<Option<DonationRecord>, DatabaseError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        Ok(records
            .iter_mut()
            .find(|r| r.gateway_payment_id == gateway_payment_id)
            .filter(|r| r.status.can_transition_to(status))
            .map(|record| {
                record.status = status;
                record.clone()
            }))
    }

    async fn find_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<DonationRecord>, DatabaseError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.gateway_payment_id == gateway_payment_id)
            .cloned())
    }

    async fn find_by_payer_cpf(&self, cpf: &str) -> Result<Vec<DonationRecord>, DatabaseError> {
        Ok(self.newest_first(|r| r.payer_cpf == cpf).await)
    }

    async fn latest_by_cpf(&self, cpf: &str) -> Result<Option<DonationRecord>, DatabaseError> {
        Ok(self
            .newest_first(|r| r.payer_cpf == cpf)
            .await
            .into_iter()
            .next())
    }

    async fn list_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<DonationRecord>, DatabaseError> {
        Ok(self
            .newest_first(|r| {
                start.map_or(true, |s| r.created_at >= s) && end.map_or(true, |e| r.created_at <= e)
            })
            .await)
    }

    async fn delete_by_status(&self, statuses: &[&str]) -> Result<u64, DatabaseError> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !statuses.contains(&r.status.as_str()));
        Ok((before - records.len()) as u64)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryReceiptStore {
    paths: RwLock<HashMap<String, String>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, short_id: impl Into<String>, storage_path: impl Into<String>) {
        self.paths
            .write()
            .await
            .insert(short_id.into(), storage_path.into());
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn find_storage_path(&self, short_id: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.paths.read().await.get(short_id).cloned())
    }
}
