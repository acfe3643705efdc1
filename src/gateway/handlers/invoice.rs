//! Invoice handlers

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ok};
use crate::auth::AuthenticatedUser;
use crate::core_types::{GiftId, PaymentId};
use crate::payment::{InvoiceLinks, InvoiceStatus};

/// Create an invoice for one unit of a gift
#[utoipa::path(
    post,
    path = "/invoice/create-invoice/{gift_id}",
    params(("gift_id" = String, Path, description = "Gift id (24 hex chars)")),
    responses(
        (status = 200, description = "Invoice created", body = InvoiceLinks),
        (status = 400, description = "Malformed id or gift sold out"),
        (status = 401, description = "Authentication failed"),
        (status = 404, description = "Gift not found"),
        (status = 502, description = "Payment provider unavailable")
    ),
    security(("telegram_init_data" = [])),
    tag = "Payment"
)]
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(gift_id): Path<String>,
) -> ApiResult<InvoiceLinks> {
    let gift_id: GiftId = gift_id
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid gift id"))?;

    let links = state
        .invoices
        .create_invoice(gift_id, user.user_id, &user.profile)
        .await?;
    ok(links)
}

/// Status of one of the caller's invoices
#[utoipa::path(
    get,
    path = "/invoice/status/{invoice_id}",
    params(("invoice_id" = i64, Path, description = "Provider invoice id")),
    responses(
        (status = 200, description = "Invoice status", body = InvoiceStatus),
        (status = 401, description = "Authentication failed"),
        (status = 404, description = "No such invoice for this user")
    ),
    security(("telegram_init_data" = [])),
    tag = "Payment"
)]
pub async fn invoice_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(invoice_id): Path<PaymentId>,
) -> ApiResult<InvoiceStatus> {
    ok(state.invoices.status(invoice_id, user.user_id).await?)
}
