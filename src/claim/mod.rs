//! Ownership Transfer Protocol
//!
//! A user opening a share link claims the transaction: the first claimer is
//! bound as receiver exactly once; everyone after (including the loser of a
//! concurrent race) gets the read path.
//!
//! ```text
//! get_transaction ── missing / not settled / sender mismatch ──► TransactionNotFound
//!        │
//!        ├── Bound ──────────────────────────────────────────────► AlreadyClaimed (read)
//!        │     (bound to the caller with sets not moved: re-apply the set steps)
//!        ▼ Unclaimed
//! bind_receiver_if_unclaimed ── false ──► re-read ──────────────► AlreadyClaimed (read)
//!        ▼ true
//! add_to_sets(claimer) ─► recompute_gift_count ─► remove_from_set(sender)
//!        ─► dispatch ×2 ─► Claimed
//! ```

pub mod error;
pub mod protocol;

use serde::Serialize;

use crate::models::{GiftDefinition, Transaction, UserSummary};

pub use error::ClaimError;
pub use protocol::TransferProtocol;

/// A transaction joined with its gift and both parties
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub gift: GiftDefinition,
    pub sender: Option<UserSummary>,
    pub receiver: Option<UserSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This call bound the claimer as receiver
    Claimed(TransactionView),
    /// Receiver was already bound (possibly by a concurrent caller); no mutation
    AlreadyClaimed(TransactionView),
}

impl ClaimOutcome {
    pub fn view(&self) -> &TransactionView {
        match self {
            ClaimOutcome::Claimed(v) | ClaimOutcome::AlreadyClaimed(v) => v,
        }
    }

    pub fn into_view(self) -> TransactionView {
        match self {
            ClaimOutcome::Claimed(v) | ClaimOutcome::AlreadyClaimed(v) => v,
        }
    }

    #[inline]
    pub fn is_first_claim(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}
