use thiserror::Error;

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("connection error: {message}")]
    ConnectionError { message: String },

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("corrupt row: {message}")]
    Decode { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::PoolExhausted,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DatabaseErrorKind::ConnectionError {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                DatabaseErrorKind::UniqueViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseErrorKind::Decode {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionError { .. } | DatabaseErrorKind::PoolExhausted
        )
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, InfrastructureError};

        match &err.kind {
            DatabaseErrorKind::NotFound { entity, id } => AppError::not_found(entity, id),
            _ => AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
        let app: AppError = err.into();
        assert_eq!(app.status_code(), 404);
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        let app: AppError = err.into();
        assert_eq!(app.status_code(), 500);
        assert!(app.is_retryable());
    }

    #[test]
    fn unique_violation_is_flagged() {
        let err = DatabaseError::new(DatabaseErrorKind::UniqueViolation {
            constraint: "donations_gateway_payment_id_key".to_string(),
        });
        assert!(err.is_unique_violation());
        assert!(!err.is_retryable());
    }
}
