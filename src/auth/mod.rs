//! Telegram Web App authentication for mini-app endpoints.
//!
//! ## Components
//! - `init_data`: init data hash verification
//! - `error`: Authentication error types (2001-2006)
//! - `models`: `TelegramUser`, `AuthenticatedUser`
//! - `middleware`: Axum middleware (verify, upsert profile, inject user)

pub mod error;
pub mod init_data;
pub mod middleware;
pub mod models;

pub use error::{AuthError, AuthErrorCode};
pub use init_data::{InitData, InitDataVerifier, sign_init_data};
pub use middleware::{AUTH_SCHEME, AuthState, extract_init_data, telegram_auth_middleware};
pub use models::{AuthenticatedUser, TelegramUser};
