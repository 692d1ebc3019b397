//! Admin dashboard queries and maintenance.
//!
//! Day and month boundaries are computed in the dashboard's fixed UTC offset
//! (Brasília by default), not in server time.

use crate::config::AdminConfig;
use crate::database::repository::{DonationRecord, DonationStore};
use crate::error::{AppError, AppResult, ValidationError};
use crate::payments::types::{DonationStatus, PaymentMethod};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Raw query string of the donation list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonationListParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DonationPage {
    pub donations: Vec<DonationRecord>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardStats {
    /// Sum of paid donations
    pub total: BigDecimal,
    pub today_total: BigDecimal,
    pub month_total: BigDecimal,
    pub count: usize,
    pub pix: usize,
    pub card: usize,
    /// Distinct payer CPFs
    pub members: usize,
}

/// Status groups the operator can purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupGroup {
    Pending,
    /// Everything shown as canceled on the dashboard, legacy spellings included.
    Canceled,
}

impl CleanupGroup {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CleanupGroup::Pending),
            "canceled" | "cancelled" => Some(CleanupGroup::Canceled),
            _ => None,
        }
    }

    pub fn statuses(&self) -> &'static [&'static str] {
        match self {
            CleanupGroup::Pending => &["pending"],
            CleanupGroup::Canceled => &["canceled", "cancelled", "declined", "refused", "failed"],
        }
    }
}

pub struct AdminDashboardService {
    store: Arc<dyn DonationStore>,
    offset: FixedOffset,
    page_size: usize,
}

impl AdminDashboardService {
    pub fn new(store: Arc<dyn DonationStore>, config: &AdminConfig) -> AppResult<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            AppError::validation(ValidationError::InvalidField {
                field: "DASHBOARD_UTC_OFFSET_HOURS".to_string(),
                reason: format!("{} is out of range", config.utc_offset_hours),
            })
        })?;

        Ok(Self {
            store,
            offset,
            page_size: config.page_size.max(1),
        })
    }

    pub async fn list(&self, params: &DonationListParams) -> AppResult<DonationPage> {
        let start = params
            .start_date
            .as_deref()
            .map(|d| parse_date("start_date", d))
            .transpose()?
            .map(|d| self.at(d, NaiveTime::MIN));
        let end = params
            .end_date
            .as_deref()
            .map(|d| parse_date("end_date", d))
            .transpose()?
            .and_then(|d| NaiveTime::from_hms_milli_opt(23, 59, 59, 999).map(|t| self.at(d, t)));

        let records = self.store.list_between(start, end).await?;
        let total = records.len();
        let total_pages = total.div_ceil(self.page_size);
        let page = params.page.unwrap_or(1).max(1);

        Ok(DonationPage {
            donations: records
                .into_iter()
                .skip((page - 1).saturating_mul(self.page_size))
                .take(self.page_size)
                .collect(),
            total,
            page,
            page_size: self.page_size,
            total_pages,
        })
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let records = self.store.list_between(None, None).await?;

        let local_today = now.with_timezone(&self.offset).date_naive();
        let today_start = self.at(local_today, NaiveTime::MIN);
        let month_start = local_today
            .with_day(1)
            .map(|d| self.at(d, NaiveTime::MIN))
            .unwrap_or(today_start);

        let zero = BigDecimal::from(0);
        let mut stats = DashboardStats {
            total: zero.clone(),
            today_total: zero.clone(),
            month_total: zero,
            count: records.len(),
            pix: 0,
            card: 0,
            members: records
                .iter()
                .map(|r| r.payer_cpf.as_str())
                .collect::<HashSet<_>>()
                .len(),
        };

        for record in &records {
            if record.payment_method == PaymentMethod::Pix.as_str() {
                stats.pix += 1;
            } else if record.payment_method == PaymentMethod::CreditCard.as_str() {
                stats.card += 1;
            }

            if record.status != DonationStatus::Paid {
                continue;
            }
            stats.total += record.amount.clone();
            if record.created_at >= month_start {
                stats.month_total += record.amount.clone();
            }
            if record.created_at >= today_start {
                stats.today_total += record.amount.clone();
            }
        }

        Ok(stats)
    }

    /// Bulk delete a status group. Refused unless `confirm` is set.
    pub async fn cleanup(&self, status: &str, confirm: bool) -> AppResult<u64> {
        let group = CleanupGroup::parse(status).ok_or_else(|| {
            AppError::validation(ValidationError::InvalidField {
                field: "status".to_string(),
                reason: "use pending ou canceled".to_string(),
            })
        })?;

        if !confirm {
            warn!(status = %status, "cleanup requested without confirmation");
            return Err(AppError::validation(ValidationError::ConfirmationRequired {
                action: format!("apagar contribuições com status {}", status),
            }));
        }

        let deleted = self.store.delete_by_status(group.statuses()).await?;
        info!(group = ?group, deleted, "donations purged by operator");
        Ok(deleted)
    }

    /// Local wall-clock time in the dashboard offset, as UTC.
    fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        self.offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            // A fixed offset has exactly one mapping for every local time.
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }
}

fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::validation(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "formato esperado AAAA-MM-DD".to_string(),
        })
    })
}
