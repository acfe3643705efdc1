//! Storage error types

use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Invalid document: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "STORAGE_UNAVAILABLE",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Conflict(_) => "DUPLICATE_KEY",
            StoreError::Invalid(_) => "INVALID_DOCUMENT",
            StoreError::Corrupt(_) => "CORRUPT_RECORD",
        }
    }

    /// Transient failures are safe to retry from outside (provider redelivery, client retry)
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE class for integrity constraint violations (CHECK etc.)
const INTEGRITY_CLASS: &str = "23";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(e.to_string())
            }
            sqlx::Error::Database(db) => match db.code() {
                Some(code) if code == UNIQUE_VIOLATION => StoreError::Conflict(db.message().to_string()),
                Some(code) if code.starts_with(INTEGRITY_CLASS) => {
                    StoreError::Database(format!("constraint violation: {}", db.message()))
                }
                _ => StoreError::Database(e.to_string()),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}
