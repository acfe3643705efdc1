//! Payment Settlement Engine
//!
//! Turns a verified payment-completion event into durable state exactly once:
//! transaction record, one `sold` unit, buyer credit.
//!
//! ```text
//! find_completed_by_payment ── hit ──► resume
//!        │ miss
//!        ▼
//! get_gift ── none ──► GiftNotFound / no capacity ──► SoldOut
//!        ▼
//! upsert_completed (which = None) ── AlreadyCompleted ──► resume   (lost a duplicate race)
//!        │ Inserted / Promoted
//!        ▼
//! increment_sold_if_available ── guard failed ──► revert ──► SoldOut
//!        ▼
//! set_ordinal ─► add_to_sets(buyer) ─► dispatch(purchase_success) ─► Settled
//!
//! resume: which set ─► AlreadySettled
//!         which unset, lease live ─► InFlight (503, provider redelivers)
//!         which unset, lease expired ─► take_over_unreserved ─► increment ...
//! ```
//!
//! A record counts as settled only once `which` is written, after its unit is
//! reserved. Nothing acknowledges, credits or claims it before that.

pub mod engine;
pub mod error;

use chrono::{DateTime, Utc};

use crate::core_types::{GiftId, PaymentId, UserId};
use crate::models::Transaction;

pub use engine::SettlementEngine;
pub use error::SettlementError;

/// A payment that has passed authenticity and freshness checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCompletedEvent {
    pub payment_id: PaymentId,
    pub paid_at: DateTime<Utc>,
    pub gift_id: GiftId,
    pub buyer_id: UserId,
    /// Used only when the buyer record is created lazily
    pub buyer_first_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// This call reserved the unit and credited the buyer
    Settled { transaction: Transaction, sold: u32 },
    /// The payment id was settled before; nothing changed
    AlreadySettled { transaction: Transaction },
}

impl SettlementOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            SettlementOutcome::Settled { transaction, .. } => transaction,
            SettlementOutcome::AlreadySettled { transaction } => transaction,
        }
    }

    #[inline]
    pub fn is_already_settled(&self) -> bool {
        matches!(self, SettlementOutcome::AlreadySettled { .. })
    }
}
