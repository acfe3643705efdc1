//! Storage boundary
//!
//! Narrow async interfaces over the three collections. Correctness under
//! concurrent, duplicated requests comes entirely from the single-document
//! conditional operations defined here; callers never hold a lock across calls.
//!
//! # Hot fields
//!
//! - `GiftDefinition::sold` changes only through [`GiftCatalog::increment_sold_if_available`]
//!   (guard: `sold < total_available`).
//! - `Transaction::which` goes from `None` to `Some` only through
//!   [`TransactionStore::set_ordinal`], after the unit is reserved.
//! - `Transaction::receiver` changes only through
//!   [`TransactionStore::bind_receiver_if_unclaimed`] (guard: still unclaimed).
//!
//! # Implementations
//!
//! - [`MemoryStore`]: `DashMap` per collection, per-entry locking
//! - [`PgStore`]: PostgreSQL, guarded `UPDATE ... WHERE` and `INSERT ... ON CONFLICT`

pub mod error;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core_types::{GiftId, PaymentId, TransactionId, UserId};
use crate::models::{CompletedTransaction, GiftDefinition, Transaction, User, UserProfile};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Gift catalog
// ============================================================================

#[async_trait]
pub trait GiftCatalog: Send + Sync {
    /// Insert a validated catalog entry (slug must be unique)
    async fn insert_gift(&self, gift: &GiftDefinition) -> StoreResult<()>;

    async fn get_gift(&self, id: GiftId) -> StoreResult<Option<GiftDefinition>>;

    async fn get_gift_by_slug(&self, slug: &str) -> StoreResult<Option<GiftDefinition>>;

    /// Atomically `sold += 1` if `sold < total_available`.
    ///
    /// Returns the new `sold` value, or `None` when the guard failed (sold out
    /// or unknown gift).
    async fn increment_sold_if_available(&self, id: GiftId) -> StoreResult<Option<u32>>;
}

// ============================================================================
// Transactions
// ============================================================================

/// Result of [`TransactionStore::upsert_completed`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No record carried this payment id; a COMPLETED one was created
    Inserted(Transaction),
    /// A PENDING invoice record was promoted to COMPLETED
    Promoted {
        transaction: Transaction,
        previous: Transaction,
    },
    /// Another settlement already completed this payment id; nothing written
    AlreadyCompleted(Transaction),
}

impl UpsertOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            UpsertOutcome::Inserted(tx) => tx,
            UpsertOutcome::Promoted { transaction, .. } => transaction,
            UpsertOutcome::AlreadyCompleted(tx) => tx,
        }
    }

    /// Compensating write that undoes this upsert
    pub fn revert(&self) -> Option<Revert> {
        match self {
            UpsertOutcome::Inserted(tx) => Some(Revert::Delete {
                id: tx.id,
                payment_id: tx.payment_id,
            }),
            UpsertOutcome::Promoted { previous, .. } => {
                Some(Revert::RestorePending(previous.clone()))
            }
            UpsertOutcome::AlreadyCompleted(_) => None,
        }
    }
}

/// Compensating write for a settlement that lost the capacity race
#[derive(Debug, Clone, PartialEq)]
pub enum Revert {
    /// Remove a record this settlement inserted
    Delete {
        id: TransactionId,
        payment_id: PaymentId,
    },
    /// Put a promoted invoice record back to its PENDING snapshot
    RestorePending(Transaction),
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a PENDING invoice record. Fails with `Conflict` if the payment id is taken.
    async fn insert_pending(&self, tx: &Transaction) -> StoreResult<()>;

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>>;

    /// Any record carrying this payment id (PENDING or COMPLETED)
    async fn find_by_payment(&self, payment_id: PaymentId) -> StoreResult<Option<Transaction>>;

    /// The COMPLETED record carrying this payment id
    async fn find_completed_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .find_by_payment(payment_id)
            .await?
            .filter(|tx| tx.status == crate::models::TransactionStatus::Completed))
    }

    /// Atomically create-or-promote the record keyed by `values.payment_id`.
    ///
    /// Only a PENDING record (or none) may be written; a COMPLETED one is left
    /// untouched and reported as [`UpsertOutcome::AlreadyCompleted`].
    async fn upsert_completed(&self, values: &CompletedTransaction) -> StoreResult<UpsertOutcome>;

    /// Record the 1-based ordinal once capacity is reserved. This marks the
    /// record settled; before it the record is in flight.
    async fn set_ordinal(&self, id: TransactionId, which: u32) -> StoreResult<()>;

    /// Take over an in-flight record whose settlement stalled.
    ///
    /// Succeeds only while the record is COMPLETED, holds no ordinal and its
    /// `updated_at` still equals `seen`; the winner's write moves `updated_at`
    /// to `now`, so concurrent callers cannot both win.
    async fn take_over_unreserved(
        &self,
        id: TransactionId,
        seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Apply a compensating write. Idempotent.
    async fn revert(&self, revert: &Revert) -> StoreResult<()>;

    /// Atomically bind `receiver` if the settled transaction is still unclaimed.
    ///
    /// Returns `true` only for the single caller whose write took effect.
    async fn bind_receiver_if_unclaimed(
        &self,
        id: TransactionId,
        receiver: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

// ============================================================================
// User directory
// ============================================================================

/// Transaction reference sets held on a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum UserSet {
    /// Owned (claim completed)
    Gifts = 1,
    /// Bought by this user, not yet claimed by anyone
    PendingGifts = 2,
    /// Every transaction where the user is sender or receiver
    Transactions = 3,
}

impl UserSet {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(UserSet::Gifts),
            2 => Some(UserSet::PendingGifts),
            3 => Some(UserSet::Transactions),
            _ => None,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create or refresh a user's Telegram profile
    async fn upsert_profile(
        &self,
        id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Set-add `tx` to each of `sets`, creating the user with `on_insert` if unseen.
    ///
    /// Adding twice is a no-op.
    async fn add_to_sets(
        &self,
        id: UserId,
        sets: &[UserSet],
        tx: TransactionId,
        on_insert: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Set-remove; missing user or missing member is a no-op
    async fn remove_from_set(&self, id: UserId, set: UserSet, tx: TransactionId)
    -> StoreResult<()>;

    /// Persist `total_gifts_count = |gifts|` and return it
    async fn recompute_gift_count(&self, id: UserId) -> StoreResult<u32>;
}

// ============================================================================
// Bundle
// ============================================================================

/// Store handles shared by every service, built once at startup
#[derive(Clone)]
pub struct Stores {
    pub gifts: Arc<dyn GiftCatalog>,
    pub transactions: Arc<dyn TransactionStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    pub fn memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Self::from_backend(store.clone()), store)
    }

    pub fn postgres(store: Arc<PgStore>) -> Self {
        Self::from_backend(store)
    }

    fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: GiftCatalog + TransactionStore + UserDirectory + 'static,
    {
        Self {
            gifts: store.clone(),
            transactions: store.clone(),
            users: store,
        }
    }
}
