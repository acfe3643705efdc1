//! Invoice service: issue an invoice for a gift, report its status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::InvoiceError;
use super::client::{CreateInvoiceRequest, InvoiceProvider};
use crate::core_types::{GiftId, PaymentId, TransactionId, UserId};
use crate::models::{
    Currency, GiftDefinition, Receiver, Transaction, TransactionStatus, UserProfile,
};
use crate::store::{GiftCatalog, StoreError, Stores, TransactionStore, UserDirectory, UserSet};

/// Payable links returned to the mini-app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLinks {
    pub payment_url: String,
    pub web_app_url: Option<String>,
    pub mini_app_url: Option<String>,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatus {
    #[schema(value_type = String, example = "PENDING")]
    pub status: TransactionStatus,
    #[schema(value_type = String, example = "2.5")]
    pub price: Decimal,
    #[schema(value_type = String, example = "USDT")]
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Invoice request settings
#[derive(Debug, Clone)]
pub struct InvoiceSettings {
    pub accepted_assets: String,
    pub expires_in_secs: u64,
}

pub struct InvoiceService {
    gifts: Arc<dyn GiftCatalog>,
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserDirectory>,
    provider: Arc<dyn InvoiceProvider>,
    settings: InvoiceSettings,
}

impl InvoiceService {
    pub fn new(
        stores: &Stores,
        provider: Arc<dyn InvoiceProvider>,
        settings: InvoiceSettings,
    ) -> Self {
        Self {
            gifts: stores.gifts.clone(),
            transactions: stores.transactions.clone(),
            users: stores.users.clone(),
            provider,
            settings,
        }
    }

    fn build_request(&self, gift: &GiftDefinition, buyer: UserId, profile: &UserProfile) -> CreateInvoiceRequest {
        let payload = serde_json::json!({
            "giftId": gift.id.to_hex(),
            "userId": buyer,
            "firstName": profile.first_name,
        });

        // USD is a fiat price; the buyer still pays in one of the accepted assets
        let (currency_type, asset, fiat) = match gift.currency {
            Currency::Usd => ("fiat", None, Some(gift.currency.as_str().to_string())),
            other => ("crypto", Some(other.as_str().to_string()), None),
        };

        CreateInvoiceRequest {
            currency_type,
            asset,
            fiat,
            accepted_assets: self.settings.accepted_assets.clone(),
            amount: gift.price.normalize().to_string(),
            description: format!("Purchasing a {} gift", gift.name),
            payload: payload.to_string(),
            expires_in: self.settings.expires_in_secs,
            allow_comments: false,
            allow_anonymous: false,
        }
    }

    /// Ask the provider for an invoice and record it as a PENDING transaction
    pub async fn create_invoice(
        &self,
        gift_id: GiftId,
        buyer: UserId,
        profile: &UserProfile,
    ) -> Result<InvoiceLinks, InvoiceError> {
        let gift = self
            .gifts
            .get_gift(gift_id)
            .await?
            .ok_or(InvoiceError::GiftNotFound(gift_id))?;

        if !gift.has_capacity() {
            return Err(InvoiceError::SoldOut(gift_id));
        }

        let invoice = self
            .provider
            .create_invoice(&self.build_request(&gift, buyer, profile))
            .await?;

        let now = Utc::now();
        let pending = Transaction {
            id: TransactionId::new(),
            gift_id: gift.id,
            sender_id: buyer,
            receiver: Receiver::Unclaimed,
            status: TransactionStatus::Pending,
            payment_id: invoice.invoice_id,
            price: gift.price,
            currency: gift.currency,
            created_at: now,
            updated_at: now,
            which: None,
        };

        let tx_id = match self.transactions.insert_pending(&pending).await {
            Ok(()) => pending.id,
            // The paid webhook got here first; its record stands
            Err(StoreError::Conflict(_)) => {
                let existing = self
                    .transactions
                    .find_by_payment(invoice.invoice_id)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Corrupt(format!(
                            "payment {} conflicted but no record found",
                            invoice.invoice_id
                        ))
                    })?;
                warn!(
                    payment_id = invoice.invoice_id,
                    transaction_id = %existing.id,
                    "Invoice already recorded"
                );
                existing.id
            }
            Err(e) => return Err(e.into()),
        };

        self.users
            .add_to_sets(buyer, &[UserSet::Transactions], tx_id, profile, now)
            .await?;

        info!(
            payment_id = invoice.invoice_id,
            gift_id = %gift.id,
            transaction_id = %tx_id,
            user_id = buyer,
            "Invoice created"
        );

        Ok(InvoiceLinks {
            payment_url: invoice.bot_invoice_url,
            web_app_url: invoice.web_app_invoice_url,
            mini_app_url: invoice.mini_app_invoice_url,
            payment_id: invoice.invoice_id,
        })
    }

    /// Status of the buyer's own invoice; other users' invoices are not found
    pub async fn status(
        &self,
        payment_id: PaymentId,
        buyer: UserId,
    ) -> Result<InvoiceStatus, InvoiceError> {
        let tx = self
            .transactions
            .find_by_payment(payment_id)
            .await?
            .filter(|t| t.sender_id == buyer)
            .ok_or(InvoiceError::TransactionNotFound(payment_id))?;

        // Paid but still reserving its unit
        let status = match tx.status {
            TransactionStatus::Completed if !tx.is_settled() => TransactionStatus::Pending,
            status => status,
        };

        Ok(InvoiceStatus {
            status,
            price: tx.price,
            currency: tx.currency,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        })
    }
}
