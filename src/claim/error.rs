//! Claim error types

use thiserror::Error;

use crate::core_types::TransactionId;
use crate::store::StoreError;

#[derive(Error, Debug, Clone)]
pub enum ClaimError {
    /// Unknown id, not settled, or sender mismatch; indistinguishable on purpose
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ClaimError {
    pub fn code(&self) -> &'static str {
        match self {
            ClaimError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            ClaimError::Storage(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ClaimError::TransactionNotFound(_) => 404,
            ClaimError::Storage(e) if e.is_transient() => 503,
            ClaimError::Storage(_) => 500,
        }
    }
}
