//! Message texts (Telegram HTML parse mode)
//!
//! Every user-controlled string is escaped before interpolation.

use super::{InlineButton, Notification};
use crate::core_types::UserId;
use crate::models::UserSummary;

const OPEN_GIFT: &str = "Open Gift";

/// Escape the characters Telegram's HTML mode treats as markup
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// First name, linked to the public profile when the user has a username
pub fn display_name(user: &UserSummary) -> String {
    let name = escape_html(&user.first_name);
    match user.username.as_deref() {
        Some(username) if !username.is_empty() => format!(
            "<a href=\"https://t.me/{}\">{}</a>",
            escape_html(username),
            name
        ),
        _ => name,
    }
}

fn open_gift(webapp_url: Option<&str>) -> Option<InlineButton> {
    webapp_url
        .filter(|url| !url.is_empty())
        .map(|url| InlineButton::new(OPEN_GIFT, url))
}

/// To the buyer, once the payment settles
pub fn purchase_success(buyer: UserId, gift_name: &str, webapp_url: Option<&str>) -> Notification {
    Notification {
        chat_id: buyer,
        text: format!(
            "The <b>{}</b> has been purchased successfully! 🎉",
            escape_html(gift_name)
        ),
        button: open_gift(webapp_url),
    }
}

/// To the claimer, after the first successful claim
pub fn gift_received(
    receiver: UserId,
    gift_name: &str,
    sender: Option<&UserSummary>,
    webapp_url: Option<&str>,
) -> Notification {
    let from = sender.map_or_else(|| "a friend".to_string(), display_name);
    Notification {
        chat_id: receiver,
        text: format!(
            "You got the gift <b>{}</b> from <b>{}</b>! 🎉",
            escape_html(gift_name),
            from
        ),
        button: open_gift(webapp_url),
    }
}

/// To the original buyer, after the first successful claim
pub fn gift_delivered(
    sender: UserId,
    gift_name: &str,
    receiver: Option<&UserSummary>,
) -> Notification {
    let to = receiver.map_or_else(|| "the user".to_string(), display_name);
    Notification {
        chat_id: sender,
        text: format!(
            "Your gift <b>{}</b> to <b>{}</b> is successfully delivered! 🎉",
            escape_html(gift_name),
            to
        ),
        button: None,
    }
}
