//! Settlement error types

use thiserror::Error;

use crate::core_types::{GiftId, PaymentId};
use crate::store::StoreError;

/// Terminal settlement failures.
///
/// `AlreadySettled` is not here: it is a successful outcome.
#[derive(Error, Debug, Clone)]
pub enum SettlementError {
    #[error("Gift not found: {0}")]
    GiftNotFound(GiftId),

    #[error("Gift sold out: {0}")]
    SoldOut(GiftId),

    /// Another delivery of this payment is between record and reservation
    #[error("Payment {0} is being settled")]
    InFlight(PaymentId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl SettlementError {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::GiftNotFound(_) => "GIFT_NOT_FOUND",
            SettlementError::SoldOut(_) => "SOLD_OUT",
            SettlementError::InFlight(_) => "SETTLEMENT_IN_FLIGHT",
            SettlementError::Storage(e) => e.code(),
        }
    }

    /// Client errors stop provider redelivery; only transient storage failures invite it
    pub fn http_status(&self) -> u16 {
        match self {
            SettlementError::GiftNotFound(_) | SettlementError::SoldOut(_) => 400,
            SettlementError::InFlight(_) => 503,
            SettlementError::Storage(e) if e.is_transient() => 503,
            SettlementError::Storage(_) => 500,
        }
    }
}
