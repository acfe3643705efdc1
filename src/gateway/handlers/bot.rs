//! Telegram bot update webhook
//!
//! Only inline queries are handled: the query text is a share token and the
//! answer is the matching "Send Gift" article. Everything else is ignored.

use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::super::state::AppState;
use crate::core_types::UserId;

#[derive(Debug, Deserialize)]
pub struct BotUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub inline_query: Option<InlineQuery>,
}

#[derive(Debug, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: BotUser,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: UserId,
}

/// Always 200 so Telegram does not redeliver; failures are logged.
#[utoipa::path(
    post,
    path = "/bot/update",
    request_body(content = String, description = "Telegram Bot API update", content_type = "application/json"),
    responses((status = 200, description = "Update consumed")),
    tag = "Bot"
)]
pub async fn bot_update(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let update: BotUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "Unparseable bot update");
            return StatusCode::OK;
        }
    };

    let Some(query) = update.inline_query else {
        debug!(update_id = update.update_id, "Ignoring non-inline update");
        return StatusCode::OK;
    };

    let articles = match state.share.lookup(query.query.trim(), query.from.id).await {
        Ok(a) => a,
        Err(e) => {
            error!(user_id = query.from.id, code = e.code(), error = %e, "Share lookup failed");
            Vec::new()
        }
    };

    if let Err(e) = state
        .dispatcher
        .notifier()
        .answer_inline_query(&query.id, &articles)
        .await
    {
        warn!(user_id = query.from.id, code = e.code(), error = %e, "answerInlineQuery failed");
    }

    StatusCode::OK
}
