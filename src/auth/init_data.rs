//! Telegram Web App init data verification.
//!
//! ```text
//! data_check_string = sorted("key=value" for every field except hash).join("\n")
//! secret_key        = HMAC-SHA256(key = "WebAppData", msg = bot_token)
//! hash              = hex(HMAC-SHA256(key = secret_key, msg = data_check_string))
//! ```

use chrono::{DateTime, Duration, Utc};
use url::form_urlencoded;

use super::error::{AuthError, AuthErrorCode};
use super::models::TelegramUser;
use crate::signing::{hmac_sha256, verify_hex};

const WEB_APP_DATA: &[u8] = b"WebAppData";

/// Verified init data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    pub user: TelegramUser,
    pub auth_date: Option<DateTime<Utc>>,
    pub start_param: Option<String>,
}

/// Build the data-check string and pull out the received hash
pub fn data_check_string(init_data: &str) -> (String, Option<String>) {
    let mut hash = None;
    let mut pairs: Vec<(String, String)> = Vec::new();

    for (key, value) in form_urlencoded::parse(init_data.as_bytes()) {
        if key == "hash" {
            hash = Some(value.into_owned());
        } else {
            pairs.push((key.into_owned(), value.into_owned()));
        }
    }

    // Stable: duplicate keys keep their relative order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n");
    (joined, hash)
}

/// Expected hash of `check_string` for `bot_token`
pub fn sign_check_string(check_string: &str, bot_token: &str) -> [u8; 32] {
    let secret = hmac_sha256(WEB_APP_DATA, bot_token.as_bytes());
    hmac_sha256(&secret, check_string.as_bytes())
}

#[derive(Clone)]
pub struct InitDataVerifier {
    bot_token: String,
    /// `None` disables the `auth_date` age check
    max_age: Option<Duration>,
}

impl InitDataVerifier {
    pub fn new(bot_token: impl Into<String>, max_age: Option<Duration>) -> Self {
        Self {
            bot_token: bot_token.into(),
            max_age,
        }
    }

    pub fn verify(&self, init_data: &str, now: DateTime<Utc>) -> Result<InitData, AuthError> {
        let (check_string, hash) = data_check_string(init_data);
        let hash = hash.ok_or_else(|| {
            AuthError::new(AuthErrorCode::InvalidSignature, "Missing hash in init data")
        })?;

        let expected = sign_check_string(&check_string, &self.bot_token);
        if !verify_hex(&expected, &hash) {
            return Err(AuthError::from_code(AuthErrorCode::InvalidSignature));
        }

        let mut user = None;
        let mut auth_date = None;
        let mut start_param = None;
        for (key, value) in form_urlencoded::parse(init_data.as_bytes()) {
            match key.as_ref() {
                "user" => user = Some(value.into_owned()),
                "auth_date" => {
                    auth_date = value
                        .parse::<i64>()
                        .ok()
                        .and_then(|secs| DateTime::from_timestamp(secs, 0))
                }
                "start_param" => start_param = Some(value.into_owned()).filter(|s| !s.is_empty()),
                _ => {}
            }
        }

        if let (Some(max_age), Some(issued)) = (self.max_age, auth_date)
            && now - issued > max_age
        {
            return Err(AuthError::from_code(AuthErrorCode::Expired));
        }

        let raw_user = user.ok_or_else(|| AuthError::from_code(AuthErrorCode::MissingUser))?;
        let user: TelegramUser = serde_json::from_str(&raw_user).map_err(|e| {
            AuthError::new(AuthErrorCode::MissingUser, format!("Invalid user data: {}", e))
        })?;

        Ok(InitData {
            user,
            auth_date,
            start_param,
        })
    }
}

/// Produce signed init data (test clients and fixtures)
pub fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in fields {
        serializer.append_pair(k, v);
    }
    let unsigned = serializer.finish();

    let (check_string, _) = data_check_string(&unsigned);
    let hash = hex::encode(sign_check_string(&check_string, bot_token));

    form_urlencoded::Serializer::new(unsigned)
        .append_pair("hash", &hash)
        .finish()
}
