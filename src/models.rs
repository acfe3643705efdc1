//! Persisted document types: gift definitions, transactions, users.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{GiftId, PaymentId, TransactionId, UserId};

// ============================================================
// CURRENCY
// ============================================================

/// Currency codes accepted for gift prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usdt,
    Ton,
    Eth,
    Btc,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usdt => "USDT",
            Currency::Ton => "TON",
            Currency::Eth => "ETH",
            Currency::Btc => "BTC",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USDT" => Ok(Currency::Usdt),
            "TON" => Ok(Currency::Ton),
            "ETH" => Ok(Currency::Eth),
            "BTC" => Ok(Currency::Btc),
            "USD" => Ok(Currency::Usd),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

// ============================================================
// GIFT DEFINITION
// ============================================================

/// Catalog entry.
///
/// `sold` only grows, only through settlement, and never exceeds `total_available`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftDefinition {
    pub id: GiftId,
    pub name: String,
    pub slug: String,
    pub price: Decimal,
    pub currency: Currency,
    pub total_available: u32,
    pub sold: u32,
    pub color: String,
    #[serde(rename = "patternID")]
    pub pattern_id: String,
    #[serde(rename = "lottieID")]
    pub lottie_id: String,
}

impl GiftDefinition {
    #[inline]
    pub fn has_capacity(&self) -> bool {
        self.sold < self.total_available
    }

    pub fn remaining(&self) -> u32 {
        self.total_available.saturating_sub(self.sold)
    }
}

// ============================================================
// TRANSACTION
// ============================================================

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// Invoice issued, not paid yet
    Pending,
    /// Paid and settled
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current holder of a settled gift.
///
/// Moves from `Unclaimed` to `Bound` exactly once, on the first successful claim.
/// Serialized as a nullable user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Receiver {
    Unclaimed,
    Bound(UserId),
}

impl Receiver {
    #[inline]
    pub fn is_unclaimed(&self) -> bool {
        matches!(self, Receiver::Unclaimed)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Receiver::Unclaimed => None,
            Receiver::Bound(id) => Some(*id),
        }
    }

    /// NULL-able column mapping
    pub fn from_column(value: Option<UserId>) -> Self {
        value.map_or(Receiver::Unclaimed, Receiver::Bound)
    }
}

impl Serialize for Receiver {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.user_id().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Receiver {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<UserId>::deserialize(deserializer).map(Receiver::from_column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub gift_id: GiftId,
    /// The buyer
    pub sender_id: UserId,
    #[serde(rename = "receiverId")]
    pub receiver: Receiver,
    pub status: TransactionStatus,
    pub payment_id: PaymentId,
    pub price: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The Nth unit of this gift sold (1-based). Written only once the unit
    /// is reserved; a COMPLETED record without it is still settling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub which: Option<u32>,
}

impl Transaction {
    /// COMPLETED and holding a reserved unit
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Completed && self.which.is_some()
    }
}

/// Values written when a payment settles (insert or PENDING → COMPLETED promotion)
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransaction {
    pub payment_id: PaymentId,
    pub gift_id: GiftId,
    pub sender_id: UserId,
    pub price: Decimal,
    pub currency: Currency,
    pub paid_at: DateTime<Utc>,
    /// When this settlement attempt wrote the record; starts its reservation lease
    pub recorded_at: DateTime<Utc>,
    pub which: Option<u32>,
}

impl CompletedTransaction {
    /// Materialize as a fresh document
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            gift_id: self.gift_id,
            sender_id: self.sender_id,
            receiver: Receiver::Unclaimed,
            status: TransactionStatus::Completed,
            payment_id: self.payment_id,
            price: self.price,
            currency: self.currency,
            created_at: self.paid_at,
            updated_at: self.recorded_at,
            which: self.which,
        }
    }
}

// ============================================================
// USER
// ============================================================

/// Telegram profile fields, refreshed on every authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub is_premium: bool,
}

impl UserProfile {
    pub fn with_first_name(first_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub telegram_id: UserId,
    #[serde(flatten)]
    pub profile: UserProfile,
    /// Owned gifts (claim completed)
    pub gifts: HashSet<TransactionId>,
    /// Gifts this user bought that nobody has claimed yet
    pub pending_gifts: HashSet<TransactionId>,
    /// Every transaction where this user is sender or receiver
    pub transactions: HashSet<TransactionId>,
    /// Cached `gifts.len()`, recomputed on every claim
    pub total_gifts_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(telegram_id: UserId, profile: UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            telegram_id,
            profile,
            gifts: HashSet::new(),
            pending_gifts: HashSet::new(),
            transactions: HashSet::new(),
            total_gifts_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display name used in notifications and API payloads
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            telegram_id: self.telegram_id,
            first_name: self.profile.first_name.clone(),
            last_name: self.profile.last_name.clone(),
            username: self.profile.username.clone(),
            is_premium: self.profile.is_premium,
            total_gifts_count: self.total_gifts_count,
        }
    }
}

/// Public projection of a user joined onto transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub telegram_id: UserId,
    pub first_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub is_premium: bool,
    pub total_gifts_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_roundtrip() {
        for c in [
            Currency::Usdt,
            Currency::Ton,
            Currency::Eth,
            Currency::Btc,
            Currency::Usd,
        ] {
            assert_eq!(c.as_str().parse::<Currency>().unwrap(), c);
        }
        assert!("DOGE".parse::<Currency>().is_err());
    }

    #[test]
    fn test_currency_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Currency::Usdt).unwrap(), "\"USDT\"");
    }

    #[test]
    fn test_receiver_from_column() {
        assert_eq!(Receiver::from_column(None), Receiver::Unclaimed);
        assert_eq!(Receiver::from_column(Some(42)), Receiver::Bound(42));
        assert!(Receiver::Unclaimed.is_unclaimed());
        assert_eq!(Receiver::Bound(7).user_id(), Some(7));
    }

    #[test]
    fn test_receiver_serde_shape() {
        let json = serde_json::to_value(Receiver::Bound(9)).unwrap();
        assert_eq!(json, serde_json::json!(9));
        let json = serde_json::to_value(Receiver::Unclaimed).unwrap();
        assert_eq!(json, serde_json::Value::Null);
        let back: Receiver = serde_json::from_str("null").unwrap();
        assert_eq!(back, Receiver::Unclaimed);
    }

    #[test]
    fn test_gift_capacity() {
        let gift = GiftDefinition {
            id: GiftId::new(),
            name: "Cake".into(),
            slug: "cake".into(),
            price: Decimal::new(5, 0),
            currency: Currency::Usdt,
            total_available: 2,
            sold: 1,
            color: "#fff".into(),
            pattern_id: "p".into(),
            lottie_id: "l".into(),
        };
        assert!(gift.has_capacity());
        assert_eq!(gift.remaining(), 1);
    }
}
