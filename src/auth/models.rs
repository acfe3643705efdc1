//! Telegram Web App identity types.

use serde::Deserialize;

use crate::core_types::UserId;
use crate::models::UserProfile;

/// The `user` object embedded in Web App init data
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramUser {
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
}

impl TelegramUser {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
            is_premium: self.is_premium.unwrap_or(false),
        }
    }
}

/// Injected into request extensions by the auth middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub profile: UserProfile,
    /// `start_param` from the deep link that opened the mini-app
    pub start_param: Option<String>,
}
