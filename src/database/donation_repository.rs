use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{DonationRecord, DonationStore, NewDonation};
use crate::payments::types::DonationStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

const COLUMNS: &str = "id, amount, type, church_location, payment_method, status, payer_name, \
     payer_email, payer_cpf, payer_phone, gateway_payment_id, gateway_reference_id, created_at";

/// Row as stored; `status` may hold legacy spellings.
#[derive(Debug, Clone, FromRow)]
struct DonationRow {
    id: Uuid,
    amount: BigDecimal,
    r#type: String,
    church_location: String,
    payment_method: String,
    status: String,
    payer_name: String,
    payer_email: String,
    payer_cpf: String,
    payer_phone: String,
    gateway_payment_id: String,
    gateway_reference_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DonationRow> for DonationRecord {
    type Error = DatabaseError;

    fn try_from(row: DonationRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<DonationStatus>().map_err(|message| {
            warn!(gateway_payment_id = %row.gateway_payment_id, status = %row.status, "unreadable donation status");
            DatabaseError::new(DatabaseErrorKind::Decode { message })
        })?;

        Ok(DonationRecord {
            id: row.id,
            amount: row.amount,
            donation_type: row.r#type,
            church_location: row.church_location,
            payment_method: row.payment_method,
            status,
            payer_name: row.payer_name,
            payer_email: row.payer_email,
            payer_cpf: row.payer_cpf,
            payer_phone: row.payer_phone,
            gateway_payment_id: row.gateway_payment_id,
            gateway_reference_id: row.gateway_reference_id,
            created_at: row.created_at,
        })
    }
}

fn into_records(rows: Vec<DonationRow>) -> Result<Vec<DonationRecord>, DatabaseError> {
    rows.into_iter().map(DonationRecord::try_from).collect()
}

/// Postgres-backed donation store
pub struct DonationRepository {
    pool: PgPool,
}

impl DonationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DonationStore for DonationRepository {
    async fn insert(&self, donation: NewDonation) -> Result<DonationRecord, DatabaseError> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "INSERT INTO donations
             (amount, type, church_location, payment_method, status, payer_name, payer_email,
              payer_cpf, payer_phone, gateway_payment_id, gateway_reference_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {COLUMNS}"
        ))
        .bind(&donation.amount)
        .bind(&donation.donation_type)
        .bind(&donation.church_location)
        .bind(donation.payment_method.as_str())
        .bind(donation.status.as_str())
        .bind(&donation.payer.name)
        .bind(&donation.payer.email)
        .bind(&donation.payer.cpf)
        .bind(&donation.payer.phone)
        .bind(&donation.gateway_payment_id)
        .bind(&donation.gateway_reference_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn update_status(
        &self,
        gateway_payment_id: &str,
        status: DonationStatus,
    ) -> Result<Option<DonationRecord>, DatabaseError> {
        let current: Vec<String> = status
            .stored_spellings()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "UPDATE donations
             SET status = $2, updated_at = NOW()
             WHERE gateway_payment_id = $1
               AND (status = 'pending' OR status = ANY($3))
             RETURNING {COLUMNS}"
        ))
        .bind(gateway_payment_id)
        .bind(status.as_str())
        .bind(&current)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(DonationRecord::try_from).transpose()
    }

    async fn find_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<DonationRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {COLUMNS} FROM donations WHERE gateway_payment_id = $1"
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(DonationRecord::try_from).transpose()
    }

    async fn find_by_payer_cpf(&self, cpf: &str) -> Result<Vec<DonationRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {COLUMNS} FROM donations
             WHERE payer_cpf = $1
             ORDER BY created_at DESC"
        ))
        .bind(cpf)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_records(rows)
    }

    async fn latest_by_cpf(&self, cpf: &str) -> Result<Option<DonationRecord>, DatabaseError> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {COLUMNS} FROM donations
             WHERE payer_cpf = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(cpf)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(DonationRecord::try_from).transpose()
    }

    async fn list_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<DonationRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            "SELECT {COLUMNS} FROM donations
             WHERE ($1::timestamptz IS NULL OR created_at >= $1)
               AND ($2::timestamptz IS NULL OR created_at <= $2)
             ORDER BY created_at DESC"
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_records(rows)
    }

    async fn delete_by_status(&self, statuses: &[&str]) -> Result<u64, DatabaseError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let result = sqlx::query("DELETE FROM donations WHERE status = ANY($1)")
            .bind(&statuses)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        crate::database::health_check(&self.pool).await
    }
}
