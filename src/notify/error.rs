//! Notification error types

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("Bot API transport error: {0}")]
    Transport(String),

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Malformed Bot API response: {0}")]
    Malformed(String),
}

impl NotifyError {
    pub fn code(&self) -> &'static str {
        match self {
            NotifyError::Transport(_) => "NOTIFY_TRANSPORT",
            NotifyError::Api { .. } => "NOTIFY_API",
            NotifyError::Malformed(_) => "NOTIFY_MALFORMED",
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            NotifyError::Malformed(e.to_string())
        } else {
            NotifyError::Transport(e.to_string())
        }
    }
}
