//! Payment provider integration (Crypto Pay)
//!
//! ## Components
//! - `webhook`: inbound signed updates, verified before settlement runs
//! - `client`: `InvoiceProvider` trait and the reqwest-backed `CryptoPayClient`
//! - `invoice`: `InvoiceService`, invoice issue and status lookup
//! - `error`: `WebhookError` / `InvoiceError`

pub mod client;
pub mod error;
pub mod invoice;
pub mod webhook;

pub use client::{CreateInvoiceRequest, CreatedInvoice, CryptoPayClient, InvoiceProvider};
pub use error::{InvoiceError, WebhookError};
pub use invoice::{InvoiceLinks, InvoiceService, InvoiceSettings, InvoiceStatus};
pub use webhook::{INVOICE_PAID, SIGNATURE_HEADER, WebhookVerifier};
