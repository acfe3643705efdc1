//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult`: handler error path, rendered in the same envelope
//! - `error_codes`: Standard error code constants

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::claim::ClaimError;
use crate::payment::{InvoiceError, WebhookError};
use crate::settlement::SettlementError;
use crate::store::StoreError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Acknowledgement returned to the payment provider's webhook
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// `success` or `already processed`
    #[schema(value_type = String, example = "success")]
    pub status: &'static str,
}

impl WebhookAck {
    pub const SUCCESS: Self = Self { status: "success" };
    pub const ALREADY_PROCESSED: Self = Self {
        status: "already processed",
    };
}

// ============================================================================
// Error path
// ============================================================================

/// Handler error, rendered as `(status, ApiResponse { code, msg })`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 + success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, msg)
    }

    pub fn not_found(code: i32, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, msg)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            "Internal server error",
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }

    /// Storage failures are logged here and never echoed
    fn storage(e: &StoreError) -> Self {
        error!(code = e.code(), error = %e, "Storage failure");
        if e.is_transient() {
            Self::service_unavailable("Service temporarily unavailable")
        } else {
            Self::internal()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.code, self.msg);
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::storage(&e)
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        let code = match e {
            WebhookError::MissingSignature => error_codes::MISSING_AUTH,
            WebhookError::AuthenticityFailure => error_codes::AUTH_FAILED,
            WebhookError::StaleEvent { .. } => error_codes::STALE_REQUEST,
            WebhookError::UnsupportedUpdate(_) => error_codes::UNSUPPORTED_UPDATE,
            WebhookError::MalformedPayload(_) => error_codes::INVALID_PARAMETER,
        };
        let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
        Self::new(status, code, e.to_string())
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::GiftNotFound(_) => {
                Self::bad_request(e.to_string()).with_code(error_codes::GIFT_NOT_FOUND)
            }
            SettlementError::SoldOut(_) => {
                Self::bad_request(e.to_string()).with_code(error_codes::SOLD_OUT)
            }
            SettlementError::InFlight(_) => Self::service_unavailable(e.to_string()),
            SettlementError::Storage(ref inner) => Self::storage(inner),
        }
    }
}

impl From<ClaimError> for ApiError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::TransactionNotFound(_) => {
                Self::not_found(error_codes::TRANSACTION_NOT_FOUND, e.to_string())
            }
            ClaimError::Storage(ref inner) => Self::storage(inner),
        }
    }
}

impl From<InvoiceError> for ApiError {
    fn from(e: InvoiceError) -> Self {
        match e {
            InvoiceError::GiftNotFound(_) => {
                Self::not_found(error_codes::GIFT_NOT_FOUND, e.to_string())
            }
            InvoiceError::SoldOut(_) => {
                Self::bad_request(e.to_string()).with_code(error_codes::SOLD_OUT)
            }
            InvoiceError::TransactionNotFound(_) => {
                Self::not_found(error_codes::TRANSACTION_NOT_FOUND, e.to_string())
            }
            InvoiceError::Provider(_) | InvoiceError::Transport(_) => {
                error!(code = e.code(), error = %e, "Payment provider failure");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    error_codes::UPSTREAM_ERROR,
                    "Payment provider unavailable",
                )
            }
            InvoiceError::Storage(ref inner) => Self::storage(inner),
        }
    }
}

impl ApiError {
    fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const SOLD_OUT: i32 = 1002;
    pub const UNSUPPORTED_UPDATE: i32 = 1003;

    // Auth errors (2xxx); 2001-2006 are shared with `AuthErrorCode`
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2003;
    pub const STALE_REQUEST: i32 = 2004;

    // Resource errors (4xxx)
    pub const GIFT_NOT_FOUND: i32 = 4001;
    pub const TRANSACTION_NOT_FOUND: i32 = 4002;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const UPSTREAM_ERROR: i32 = 5002;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{GiftId, TransactionId};

    #[test]
    fn test_success_envelope() {
        let json = serde_json::to_value(ApiResponse::success(7)).unwrap();
        assert_eq!(json, serde_json::json!({"code": 0, "msg": "ok", "data": 7}));

        let json = serde_json::to_value(ApiResponse::<()>::error(1001, "bad")).unwrap();
        assert_eq!(json, serde_json::json!({"code": 1001, "msg": "bad"}));
    }

    #[test]
    fn test_webhook_error_statuses() {
        let e = ApiError::from(WebhookError::AuthenticityFailure);
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
        let e = ApiError::from(WebhookError::StaleEvent { age_secs: 900 });
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
        assert_eq!(e.code, error_codes::STALE_REQUEST);
        let e = ApiError::from(WebhookError::UnsupportedUpdate("x".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_settlement_and_claim_errors() {
        let gift = GiftId::new();
        let e = ApiError::from(SettlementError::SoldOut(gift));
        assert_eq!((e.status, e.code), (StatusCode::BAD_REQUEST, error_codes::SOLD_OUT));
        let e = ApiError::from(SettlementError::GiftNotFound(gift));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        let e = ApiError::from(SettlementError::InFlight(9));
        assert_eq!(
            (e.status, e.code),
            (StatusCode::SERVICE_UNAVAILABLE, error_codes::SERVICE_UNAVAILABLE)
        );

        let e = ApiError::from(ClaimError::TransactionNotFound(TransactionId::new()));
        assert_eq!(e.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_message_is_generic() {
        let e = ApiError::from(StoreError::Unavailable("pool timed out on 10.0.0.5".into()));
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!e.msg.contains("10.0.0.5"));
    }
}
