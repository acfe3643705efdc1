//! Crypto Pay API client
//!
//! `POST {api_endpoint}/{method}` with header `Crypto-Pay-API-Token`;
//! responses are `{ ok, result?, error? }`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::InvoiceError;

pub const API_TOKEN_HEADER: &str = "Crypto-Pay-API-Token";

/// `createInvoice` parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateInvoiceRequest {
    /// "crypto" or "fiat"
    pub currency_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiat: Option<String>,
    pub accepted_assets: String,
    pub amount: String,
    pub description: String,
    pub payload: String,
    pub expires_in: u64,
    pub allow_comments: bool,
    pub allow_anonymous: bool,
}

/// The fields of a created invoice the service hands back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedInvoice {
    pub invoice_id: i64,
    pub bot_invoice_url: String,
    #[serde(default)]
    pub web_app_invoice_url: Option<String>,
    #[serde(default)]
    pub mini_app_invoice_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
struct CryptoPayResponse<R> {
    ok: bool,
    result: Option<R>,
    /// A bare string or `{ code, name }`
    error: Option<serde_json::Value>,
}

fn describe_error(error: Option<serde_json::Value>) -> String {
    match error {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Object(map)) => map
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| serde_json::Value::Object(map).to_string()),
        Some(other) => other.to_string(),
        None => "Unknown error occurred".to_string(),
    }
}

/// Payment provider seam
#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<CreatedInvoice, InvoiceError>;
}

pub struct CryptoPayClient {
    client: reqwest::Client,
    api_endpoint: String,
    api_token: String,
}

impl CryptoPayClient {
    pub fn new(api_endpoint: &str, api_token: &str, timeout: Duration) -> Result<Self, InvoiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvoiceError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_endpoint: api_endpoint.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    async fn call<T, R>(&self, method: &'static str, params: &T) -> Result<R, InvoiceError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.api_endpoint, method))
            .header(API_TOKEN_HEADER, &self.api_token)
            .json(params)
            .send()
            .await?;

        let status = response.status();
        let body: CryptoPayResponse<R> = response.json().await.map_err(|e| {
            InvoiceError::Provider(format!("{}: unreadable response ({}): {}", method, status, e))
        })?;

        if !body.ok {
            return Err(InvoiceError::Provider(describe_error(body.error)));
        }

        body.result
            .ok_or_else(|| InvoiceError::Provider(format!("{}: missing result", method)))
    }
}

#[async_trait]
impl InvoiceProvider for CryptoPayClient {
    async fn create_invoice(
        &self,
        request: &CreateInvoiceRequest,
    ) -> Result<CreatedInvoice, InvoiceError> {
        let invoice: CreatedInvoice = self.call("createInvoice", request).await?;
        debug!(invoice_id = invoice.invoice_id, "createInvoice ok");
        Ok(invoice)
    }
}
