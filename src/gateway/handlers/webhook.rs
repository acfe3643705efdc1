//! Payment provider webhook

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use tracing::{info, warn};

use super::super::state::AppState;
use super::super::types::{ApiError, WebhookAck};
use crate::payment::SIGNATURE_HEADER;
use crate::settlement::SettlementOutcome;

/// Crypto Pay webhook
///
/// The raw body is verified before it is parsed. Redeliveries of a settled
/// payment are acknowledged without side effects.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body(content = String, description = "Signed Crypto Pay update", content_type = "application/json"),
    params(
        ("crypto-pay-api-signature" = String, Header, description = "hex(HMAC-SHA256(SHA-256(api_token), body))")
    ),
    responses(
        (status = 200, description = "Settled or already processed", body = WebhookAck),
        (status = 400, description = "Sold out, unknown gift, unsupported or malformed update"),
        (status = 401, description = "Bad signature or stale update"),
        (status = 500, description = "Storage failure"),
        (status = 503, description = "Storage temporarily unavailable")
    ),
    tag = "Payment"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = state
        .webhook
        .verify(&body, signature, Utc::now())
        .map_err(|e| {
            warn!(code = e.code(), error = %e, "Webhook rejected");
            ApiError::from(e)
        })?;

    let outcome = state.settlement.settle(&event).await.map_err(|e| {
        info!(payment_id = event.payment_id, code = e.code(), "Settlement refused");
        ApiError::from(e)
    })?;

    Ok(Json(match outcome {
        SettlementOutcome::Settled { .. } => WebhookAck::SUCCESS,
        SettlementOutcome::AlreadySettled { .. } => WebhookAck::ALREADY_PROCESSED,
    }))
}
