//! Crypto Pay webhook verification
//!
//! Order matters: signature over the raw bytes first, then parse, then
//! freshness and update type. A rejected update never reaches settlement.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::WebhookError;
use crate::core_types::{GiftId, PaymentId, UserId};
use crate::settlement::PaymentCompletedEvent;
use crate::signing::{hmac_sha256, sha256, verify_hex};

pub const SIGNATURE_HEADER: &str = "crypto-pay-api-signature";
pub const INVOICE_PAID: &str = "invoice_paid";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUpdate {
    pub update_id: i64,
    pub update_type: String,
    pub request_date: DateTime<Utc>,
    pub payload: PaidInvoice,
}

/// The invoice object carried by an `invoice_paid` update (fields we read)
#[derive(Debug, Clone, Deserialize)]
pub struct PaidInvoice {
    pub invoice_id: PaymentId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_asset: Option<String>,
    #[serde(default)]
    pub paid_amount: Option<String>,
    /// Application payload set at invoice creation (a JSON string)
    #[serde(default)]
    pub payload: Option<String>,
}

/// Decoded `PaidInvoice::payload`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub gift_id: GiftId,
    pub user_id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// `hex(HMAC-SHA256(key = SHA-256(api_token), raw_body))`
pub fn compute_signature(raw_body: &[u8], api_token: &str) -> String {
    hex::encode(hmac_sha256(&sha256(api_token.as_bytes()), raw_body))
}

pub fn verify_signature(
    raw_body: &[u8],
    signature: Option<&str>,
    api_token: &str,
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let expected = hmac_sha256(&sha256(api_token.as_bytes()), raw_body);
    if !verify_hex(&expected, signature) {
        return Err(WebhookError::AuthenticityFailure);
    }
    Ok(())
}

/// Reject updates older than `window`. Updates dated in the future by more
/// than `window` are rejected too.
pub fn check_freshness(
    request_date: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<(), WebhookError> {
    let age = now - request_date;
    if age > window || -age > window {
        return Err(WebhookError::StaleEvent {
            age_secs: age.num_seconds(),
        });
    }
    Ok(())
}

pub fn parse_update(raw_body: &[u8]) -> Result<WebhookUpdate, WebhookError> {
    serde_json::from_slice(raw_body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
}

/// Extract the settlement event from an `invoice_paid` update
pub fn parse_paid_event(update: &WebhookUpdate) -> Result<PaymentCompletedEvent, WebhookError> {
    if update.update_type != INVOICE_PAID {
        return Err(WebhookError::UnsupportedUpdate(update.update_type.clone()));
    }

    let raw = update
        .payload
        .payload
        .as_deref()
        .ok_or_else(|| WebhookError::MalformedPayload("missing invoice payload".into()))?;
    let inner: InvoicePayload = serde_json::from_str(raw)
        .map_err(|e| WebhookError::MalformedPayload(format!("invoice payload: {}", e)))?;

    Ok(PaymentCompletedEvent {
        payment_id: update.payload.invoice_id,
        paid_at: update.payload.paid_at.unwrap_or(update.request_date),
        gift_id: inner.gift_id,
        buyer_id: inner.user_id,
        buyer_first_name: inner.first_name,
    })
}

/// Full inbound check: authenticity, shape, freshness, update type.
#[derive(Clone)]
pub struct WebhookVerifier {
    api_token: String,
    window: Duration,
}

impl WebhookVerifier {
    pub fn new(api_token: impl Into<String>, window: Duration) -> Self {
        Self {
            api_token: api_token.into(),
            window,
        }
    }

    pub fn verify(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PaymentCompletedEvent, WebhookError> {
        verify_signature(raw_body, signature, &self.api_token)?;
        let update = parse_update(raw_body)?;
        check_freshness(update.request_date, now, self.window)?;
        parse_paid_event(&update)
    }
}
