//! Payment provider error types

use thiserror::Error;

use crate::core_types::{GiftId, PaymentId};
use crate::store::StoreError;

/// Inbound webhook rejections. Nothing is mutated when any of these fire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    AuthenticityFailure,

    #[error("Webhook request too old ({age_secs}s)")]
    StaleEvent { age_secs: i64 },

    #[error("Unsupported update type: {0}")]
    UnsupportedUpdate(String),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "MISSING_SIGNATURE",
            WebhookError::AuthenticityFailure => "INVALID_SIGNATURE",
            WebhookError::StaleEvent { .. } => "STALE_EVENT",
            WebhookError::UnsupportedUpdate(_) => "UNSUPPORTED_UPDATE",
            WebhookError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            WebhookError::MissingSignature
            | WebhookError::AuthenticityFailure
            | WebhookError::StaleEvent { .. } => 401,
            WebhookError::UnsupportedUpdate(_) | WebhookError::MalformedPayload(_) => 400,
        }
    }
}

/// Outbound invoice creation and status lookup failures
#[derive(Error, Debug, Clone)]
pub enum InvoiceError {
    #[error("Gift not found: {0}")]
    GiftNotFound(GiftId),

    #[error("Gift sold out: {0}")]
    SoldOut(GiftId),

    #[error("Transaction not found for payment {0}")]
    TransactionNotFound(PaymentId),

    #[error("Payment provider rejected request: {0}")]
    Provider(String),

    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl InvoiceError {
    pub fn code(&self) -> &'static str {
        match self {
            InvoiceError::GiftNotFound(_) => "GIFT_NOT_FOUND",
            InvoiceError::SoldOut(_) => "SOLD_OUT",
            InvoiceError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            InvoiceError::Provider(_) => "PROVIDER_ERROR",
            InvoiceError::Transport(_) => "PROVIDER_UNAVAILABLE",
            InvoiceError::Storage(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            InvoiceError::GiftNotFound(_) | InvoiceError::TransactionNotFound(_) => 404,
            InvoiceError::SoldOut(_) => 400,
            InvoiceError::Provider(_) | InvoiceError::Transport(_) => 502,
            InvoiceError::Storage(e) if e.is_transient() => 503,
            InvoiceError::Storage(_) => 500,
        }
    }
}

impl From<reqwest::Error> for InvoiceError {
    fn from(e: reqwest::Error) -> Self {
        InvoiceError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_status() {
        assert_eq!(WebhookError::AuthenticityFailure.http_status(), 401);
        assert_eq!(WebhookError::StaleEvent { age_secs: 400 }.http_status(), 401);
        assert_eq!(
            WebhookError::UnsupportedUpdate("x".into()).http_status(),
            400
        );
    }

    #[test]
    fn test_invoice_status() {
        assert_eq!(InvoiceError::GiftNotFound(GiftId::new()).http_status(), 404);
        assert_eq!(InvoiceError::Provider("x".into()).http_status(), 502);
        assert_eq!(InvoiceError::Provider("x".into()).code(), "PROVIDER_ERROR");
    }
}
