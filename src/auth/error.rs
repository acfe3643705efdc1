//! Authentication error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::gateway::types::ApiResponse;

/// Authentication error codes (2001-2006).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 2001: No Authorization header
    MissingAuth = 2001,
    /// 2002: Header present but not `TelegramWebApp <initData>`
    InvalidFormat = 2002,
    /// 2003: initData hash does not match
    InvalidSignature = 2003,
    /// 2004: `auth_date` older than the allowed age
    Expired = 2004,
    /// 2005: initData carries no usable `user`
    MissingUser = 2005,
    /// 2006: Profile upsert failed
    InternalError = 2006,
}

impl AuthErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MissingAuth => "MISSING_AUTH",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Expired => "AUTH_EXPIRED",
            Self::MissingUser => "MISSING_USER",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Authentication error with message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_code(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::MissingAuth => "No authorization header",
            AuthErrorCode::InvalidFormat => "Invalid Authorization header format",
            AuthErrorCode::InvalidSignature => "Invalid authentication",
            AuthErrorCode::Expired => "Authentication data expired",
            AuthErrorCode::MissingUser => "No user data found",
            AuthErrorCode::InternalError => "Authentication failed",
        };
        Self::new(code, message)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.code.code(), self.message);
        (self.code.http_status(), Json(body)).into_response()
    }
}
