//! Claim handler (ownership transfer)

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};
use tracing::info;

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use crate::auth::AuthenticatedUser;
use crate::claim::TransactionView;
use crate::core_types::{TransactionId, UserId};

/// Open a shared gift
///
/// The first caller becomes the receiver. Later calls, including the loser of
/// a concurrent claim, get the same view without any change.
#[utoipa::path(
    get,
    path = "/transaction/{id}/{sender_id}",
    params(
        ("id" = String, Path, description = "Transaction id (24 hex chars)"),
        ("sender_id" = i64, Path, description = "Expected buyer's Telegram id")
    ),
    responses(
        (status = 200, description = "Transaction with gift, sender and receiver", content_type = "application/json"),
        (status = 400, description = "Malformed transaction id"),
        (status = 401, description = "Authentication failed"),
        (status = 404, description = "No such completed transaction from this sender")
    ),
    security(("telegram_init_data" = [])),
    tag = "Transfer"
)]
pub async fn claim_transaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((id, sender_id)): Path<(String, UserId)>,
) -> ApiResult<TransactionView> {
    let tx_id: TransactionId = id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid transaction id"))?;

    let outcome = state
        .transfers
        .claim(tx_id, sender_id, user.user_id)
        .await?;

    if outcome.is_first_claim() {
        info!(transaction_id = %tx_id, user_id = user.user_id, "Claim accepted");
    }
    ok(outcome.into_view())
}
