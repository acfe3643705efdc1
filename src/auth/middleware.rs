//! Authentication middleware for Axum.
//!
//! `Authorization: TelegramWebApp <initData>` → verify → upsert profile →
//! inject [`AuthenticatedUser`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tracing::{debug, error};

use super::error::{AuthError, AuthErrorCode};
use super::init_data::InitDataVerifier;
use super::models::AuthenticatedUser;
use crate::store::UserDirectory;

pub const AUTH_SCHEME: &str = "TelegramWebApp ";

/// Authentication state shared across requests.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: InitDataVerifier,
    pub users: Arc<dyn UserDirectory>,
}

/// Extract the raw init data from the Authorization header.
pub fn extract_init_data(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::from_code(AuthErrorCode::MissingAuth))?;

    value
        .strip_prefix(AUTH_SCHEME)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::from_code(AuthErrorCode::InvalidFormat))
}

/// Axum middleware for Telegram Web App authentication.
///
/// Users are created on first contact and their profile refreshed on every
/// request.
pub async fn telegram_auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let now = Utc::now();
    let init = auth.verifier.verify(extract_init_data(request.headers())?, now)?;

    let profile = init.user.profile();
    auth.users
        .upsert_profile(init.user.id, &profile, now)
        .await
        .map_err(|e| {
            error!(user_id = init.user.id, error = %e, "Profile upsert failed");
            AuthError::from_code(AuthErrorCode::InternalError)
        })?;

    debug!(user_id = init.user.id, "Authenticated");
    request.extensions_mut().insert(AuthenticatedUser {
        user_id: init.user.id,
        profile,
        start_param: init.start_param,
    });

    Ok(next.run(request).await)
}
