//! Donor lookup: form pre-fill and donation history by CPF.

use crate::database::repository::{DonationRecord, DonationStore};
use crate::error::{AppError, AppResult};
use crate::validation::digits_only;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Placeholder e-mail written by the old PagBank sandbox; never offered back.
const SANDBOX_EMAIL: &str = "comprador@sandbox.pagseguro.com.br";

/// Contact details used to pre-fill the donation form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DonorContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub donation_type: String,
    pub amount: BigDecimal,
    pub church_location: String,
    pub payment_method: String,
    pub status: String,
}

impl From<DonationRecord> for HistoryEntry {
    fn from(record: DonationRecord) -> Self {
        Self {
            id: record.id,
            date: record.created_at,
            donation_type: record.donation_type,
            amount: record.amount,
            church_location: record.church_location,
            payment_method: record.payment_method,
            status: record.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationHistory {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donor_name: Option<String>,
    pub donations: Vec<HistoryEntry>,
}

pub struct DonorLookupService {
    store: Arc<dyn DonationStore>,
}

impl DonorLookupService {
    pub fn new(store: Arc<dyn DonationStore>) -> Self {
        Self { store }
    }

    /// Contact details from the payer's most recent donation.
    pub async fn find_donor(&self, cpf: &str) -> AppResult<Option<DonorContact>> {
        let cpf = clean_cpf(cpf)?;
        let latest = self.store.latest_by_cpf(&cpf).await?;
        debug!(found = latest.is_some(), "donor lookup");

        Ok(latest.map(|record| DonorContact {
            name: record.payer_name,
            email: if record.payer_email == SANDBOX_EMAIL {
                String::new()
            } else {
                record.payer_email
            },
            phone: record.payer_phone,
        }))
    }

    /// Every donation of the payer, newest first, optionally for one campus.
    pub async fn history(
        &self,
        cpf: &str,
        church_location: Option<&str>,
    ) -> AppResult<DonationHistory> {
        let cpf = clean_cpf(cpf)?;
        let records: Vec<DonationRecord> = self
            .store
            .find_by_payer_cpf(&cpf)
            .await?
            .into_iter()
            .filter(|r| church_location.map_or(true, |loc| r.church_location == loc))
            .collect();

        let donor_name = records.first().map(|r| r.payer_name.clone());
        Ok(DonationHistory {
            found: !records.is_empty(),
            donor_name,
            donations: records.into_iter().map(HistoryEntry::from).collect(),
        })
    }
}

fn clean_cpf(cpf: &str) -> AppResult<String> {
    let digits = digits_only(cpf);
    if digits.is_empty() {
        return Err(AppError::missing_field("cpf"));
    }
    Ok(digits)
}
