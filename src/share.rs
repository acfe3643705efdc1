//! Inline share lookup
//!
//! A buyer types the 16-character share token of a transaction into the bot's
//! inline query; the answer is one article carrying a deep link the receiver
//! opens to claim. Read-only: nothing here mutates state.

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::core_types::{TransactionId, UserId};
use crate::notify::{InlineArticle, InlineButton};
use crate::store::{GiftCatalog, StoreError, Stores, TransactionStore, UserDirectory};

/// base64 of a 12-byte transaction id
pub const SHARE_TOKEN_LEN: usize = 16;

const ARTICLE_TITLE: &str = "Send Gift";
const ARTICLE_TEXT: &str = "🎁 I have a <b>gift</b> for you! Tap the button below to open it.";
const RECEIVE_BUTTON: &str = "Receive Gift";

/// Share token for a transaction (what the mini-app puts in the inline query)
pub fn share_token(id: TransactionId) -> String {
    id.to_base64()
}

/// Decode a share token; `None` for anything malformed
pub fn decode_share_token(token: &str) -> Option<TransactionId> {
    if token.len() != SHARE_TOKEN_LEN {
        return None;
    }
    TransactionId::from_base64(token).ok()
}

/// `{webapp_url}?startapp={transactionId}-{senderId}`
pub fn deep_link(webapp_url: &str, tx: TransactionId, sender: UserId) -> Option<String> {
    let mut url = Url::parse(webapp_url).ok()?;
    url.query_pairs_mut()
        .append_pair("startapp", &format!("{}-{}", tx, sender));
    Some(url.into())
}

pub struct ShareService {
    gifts: Arc<dyn GiftCatalog>,
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserDirectory>,
    webapp_url: Option<String>,
}

impl ShareService {
    pub fn new(stores: &Stores, webapp_url: Option<String>) -> Self {
        Self {
            gifts: stores.gifts.clone(),
            transactions: stores.transactions.clone(),
            users: stores.users.clone(),
            webapp_url,
        }
    }

    /// Inline results for `token` typed by `sender`. Malformed or foreign
    /// tokens yield an empty list; only storage failures are errors.
    pub async fn lookup(
        &self,
        token: &str,
        sender: UserId,
    ) -> Result<Vec<InlineArticle>, StoreError> {
        let Some(tx_id) = decode_share_token(token) else {
            debug!(len = token.len(), "Malformed share token");
            return Ok(Vec::new());
        };

        let Some(webapp_url) = self.webapp_url.as_deref() else {
            debug!("Web app URL not configured");
            return Ok(Vec::new());
        };

        let owns = self
            .users
            .get_user(sender)
            .await?
            .is_some_and(|u| u.transactions.contains(&tx_id));
        if !owns {
            debug!(transaction_id = %tx_id, user_id = sender, "Transaction not in user's set");
            return Ok(Vec::new());
        }

        let Some(tx) = self
            .transactions
            .get_transaction(tx_id)
            .await?
            .filter(|t| t.sender_id == sender)
        else {
            return Ok(Vec::new());
        };

        let Some(gift) = self.gifts.get_gift(tx.gift_id).await? else {
            return Ok(Vec::new());
        };

        let Some(link) = deep_link(webapp_url, tx.id, sender) else {
            debug!(webapp_url, "Web app URL is not a valid URL");
            return Ok(Vec::new());
        };

        Ok(vec![InlineArticle {
            id: tx.id.to_hex(),
            title: ARTICLE_TITLE.to_string(),
            description: format!("Send a gift of {}", gift.name),
            message_text: ARTICLE_TEXT.to_string(),
            button: InlineButton::new(RECEIVE_BUTTON, link),
        }])
    }
}
