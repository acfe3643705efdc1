//! HTTP handlers
//!
//! - `webhook`: payment provider webhook → settlement
//! - `transaction`: claim a shared gift
//! - `invoice`: create / query invoices
//! - `bot`: Telegram bot updates (inline share)
//! - `health`: liveness + storage ping

pub mod bot;
pub mod health;
pub mod invoice;
pub mod transaction;
pub mod webhook;

pub use bot::bot_update;
pub use health::{HealthResponse, health_check};
pub use invoice::{create_invoice, invoice_status};
pub use transaction::claim_transaction;
pub use webhook::payment_webhook;
