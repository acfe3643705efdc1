//! Notification channel
//!
//! Best-effort push messages to users through the Telegram Bot API.
//!
//! ## Components
//! - `error`: Bot API failure types
//! - `messages`: HTML message builders (purchase / received / delivered)
//! - `telegram`: `TelegramNotifier`, the reqwest-backed Bot API client
//! - `dispatcher`: fire-and-forget task dispatch with its own log path
//!
//! Notification failures never propagate into settlement or claim results.

pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;

use crate::core_types::UserId;

pub use dispatcher::NotificationDispatcher;
pub use error::NotifyError;
pub use telegram::TelegramNotifier;

/// URL button rendered under a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub url: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
        }
    }
}

/// An HTML-formatted message addressed to one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub chat_id: UserId,
    pub text: String,
    pub button: Option<InlineButton>,
}

/// One article in an inline query answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArticle {
    pub id: String,
    pub title: String,
    pub description: String,
    /// HTML message posted when the article is picked
    pub message_text: String,
    pub button: InlineButton,
}

/// Outbound bot channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message to a user's private chat
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Answer an inline query; an empty slice clears the result list
    async fn answer_inline_query(
        &self,
        query_id: &str,
        articles: &[InlineArticle],
    ) -> Result<(), NotifyError>;
}
