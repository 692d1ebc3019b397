use crate::database::error::DatabaseError;
use crate::database::repository::ReceiptStore;
use async_trait::async_trait;
use sqlx::PgPool;

/// Reads the `receipts_log` table written by the receipt generator.
pub struct ReceiptRepository {
    pool: PgPool,
}

impl ReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptStore for ReceiptRepository {
    async fn find_storage_path(&self, short_id: &str) -> Result<Option<String>, DatabaseError> {
        sqlx::query_scalar::<_, String>("SELECT storage_path FROM receipts_log WHERE short_id = $1")
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
