//! Telegram Bot API client
//!
//! `POST {api_base}/bot{token}/{method}` with a JSON body; every response is
//! `{ ok, result?, error_code?, description? }`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{InlineArticle, InlineButton, Notification, Notifier, NotifyError};

/// Bot API client used for push messages and inline answers
pub struct TelegramNotifier {
    client: reqwest::Client,
    /// `{api_base}/bot{token}`
    endpoint: String,
}

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: [[&'a InlineButton; 1]; 1],
}

impl<'a> InlineKeyboard<'a> {
    fn single(button: &'a InlineButton) -> Self {
        Self {
            inline_keyboard: [[button]],
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Serialize)]
struct InputTextMessageContent<'a> {
    message_text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct InlineQueryResultArticle<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
    title: &'a str,
    description: &'a str,
    input_message_content: InputTextMessageContent<'a>,
    reply_markup: InlineKeyboard<'a>,
}

#[derive(Serialize)]
struct AnswerInlineQueryRequest<'a> {
    inline_query_id: &'a str,
    results: Vec<InlineQueryResultArticle<'a>>,
}

#[derive(Deserialize)]
struct BotApiResponse<R> {
    ok: bool,
    result: Option<R>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl<'a> SendMessageRequest<'a> {
    fn from_notification(n: &'a Notification) -> Self {
        Self {
            chat_id: n.chat_id,
            text: &n.text,
            parse_mode: "HTML",
            reply_markup: n.button.as_ref().map(InlineKeyboard::single),
        }
    }
}

impl<'a> InlineQueryResultArticle<'a> {
    fn from_article(a: &'a InlineArticle) -> Self {
        Self {
            kind: "article",
            id: &a.id,
            title: &a.title,
            description: &a.description,
            input_message_content: InputTextMessageContent {
                message_text: &a.message_text,
                parse_mode: "HTML",
            },
            reply_markup: InlineKeyboard::single(&a.button),
        }
    }
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        })
    }

    async fn call<T, R>(&self, method: &'static str, params: &T) -> Result<R, NotifyError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, method))
            .json(params)
            .send()
            .await?;

        let body: BotApiResponse<R> = response.json().await?;

        if !body.ok {
            return Err(NotifyError::Api {
                code: body.error_code.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
            });
        }

        body.result
            .ok_or_else(|| NotifyError::Malformed(format!("{}: missing result", method)))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let request = SendMessageRequest::from_notification(notification);
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        debug!(chat_id = notification.chat_id, "sendMessage ok");
        Ok(())
    }

    async fn answer_inline_query(
        &self,
        query_id: &str,
        articles: &[InlineArticle],
    ) -> Result<(), NotifyError> {
        let request = AnswerInlineQueryRequest {
            inline_query_id: query_id,
            results: articles
                .iter()
                .map(InlineQueryResultArticle::from_article)
                .collect(),
        };
        let _: bool = self.call("answerInlineQuery", &request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_message_payload() {
        let n = Notification {
            chat_id: 42,
            text: "<b>hi</b>".into(),
            button: Some(InlineButton::new("Open Gift", "https://app.example")),
        };
        let value = serde_json::to_value(SendMessageRequest::from_notification(&n)).unwrap();
        assert_eq!(
            value,
            json!({
                "chat_id": 42,
                "text": "<b>hi</b>",
                "parse_mode": "HTML",
                "reply_markup": {
                    "inline_keyboard": [[{"text": "Open Gift", "url": "https://app.example"}]]
                }
            })
        );
    }

    #[test]
    fn test_send_message_without_button() {
        let n = Notification {
            chat_id: 1,
            text: "x".into(),
            button: None,
        };
        let value = serde_json::to_value(SendMessageRequest::from_notification(&n)).unwrap();
        assert!(value.get("reply_markup").is_none());
    }

    #[test]
    fn test_inline_article_payload() {
        let article = InlineArticle {
            id: "abc".into(),
            title: "Send Gift".into(),
            description: "Send a gift of Cake".into(),
            message_text: "hello".into(),
            button: InlineButton::new("Receive Gift", "https://app.example?startapp=a-1"),
        };
        let value = serde_json::to_value(InlineQueryResultArticle::from_article(&article)).unwrap();
        assert_eq!(value["type"], "article");
        assert_eq!(value["input_message_content"]["parse_mode"], "HTML");
        assert_eq!(
            value["reply_markup"]["inline_keyboard"][0][0]["text"],
            "Receive Gift"
        );
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let n = TelegramNotifier::new("https://api.telegram.org/", "123:abc", Duration::from_secs(1))
            .unwrap();
        assert_eq!(n.endpoint, "https://api.telegram.org/bot123:abc");
    }

    #[test]
    fn test_error_response_decodes() {
        let body: BotApiResponse<serde_json::Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .unwrap();
        assert!(!body.ok);
        assert_eq!(body.error_code, Some(403));
        assert!(body.result.is_none());
    }
}
