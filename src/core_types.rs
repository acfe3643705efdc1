//! Core types used throughout the system
//!
//! Identifiers for the three persisted collections (gifts, transactions, users).

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// User ID - the stable Telegram identity of a user.
///
/// Telegram ids are positive 52-bit integers; stored as BIGINT.
pub type UserId = i64;

/// Length of a document id in bytes
pub const DOC_ID_LEN: usize = 12;

/// Errors when parsing a document id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocIdError {
    #[error("Invalid id length: expected {DOC_ID_LEN} bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid id encoding")]
    InvalidEncoding,
}

macro_rules! doc_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; DOC_ID_LEN]);

        impl $name {
            /// Generate a new id: 4-byte big-endian unix seconds + 8 random bytes.
            ///
            /// Ids sort roughly by creation time.
            pub fn new() -> Self {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);

                let mut bytes = [0u8; DOC_ID_LEN];
                bytes[..4].copy_from_slice(&secs.to_be_bytes());
                rand::thread_rng().fill_bytes(&mut bytes[4..]);
                Self(bytes)
            }

            pub fn from_bytes(bytes: [u8; DOC_ID_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; DOC_ID_LEN] {
                &self.0
            }

            /// 24 lowercase hex characters
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Standard base64 (16 characters, no padding needed)
            pub fn to_base64(&self) -> String {
                BASE64.encode(self.0)
            }

            /// Decode from standard base64; anything that is not exactly 12 bytes is rejected.
            pub fn from_base64(s: &str) -> Result<Self, DocIdError> {
                let raw = BASE64.decode(s).map_err(|_| DocIdError::InvalidEncoding)?;
                let bytes: [u8; DOC_ID_LEN] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| DocIdError::InvalidLength(raw.len()))?;
                Ok(Self(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = DocIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != DOC_ID_LEN * 2 {
                    return Err(DocIdError::InvalidLength(s.len() / 2));
                }
                let raw = hex::decode(s).map_err(|_| DocIdError::InvalidEncoding)?;
                let bytes: [u8; DOC_ID_LEN] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| DocIdError::InvalidLength(raw.len()))?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

doc_id!(
    /// Gift definition id (catalog entry)
    GiftId
);

doc_id!(
    /// Transaction id - the unit of settlement and transfer
    TransactionId
);

/// External payment id (Crypto Pay invoice id). Idempotency key for settlement.
pub type PaymentId = i64;
