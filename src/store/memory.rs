//! In-memory store
//!
//! `DashMap` per collection. Every conditional operation runs while holding the
//! entry's shard lock, which gives the same single-document atomicity the
//! PostgreSQL store gets from guarded statements. No lock is held across an
//! `.await`.
//!
//! Lock order when two maps are touched: `payments` before `transactions`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{
    GiftCatalog, Revert, StoreError, StoreResult, TransactionStore, UpsertOutcome, UserDirectory,
    UserSet,
};
use crate::core_types::{GiftId, PaymentId, TransactionId, UserId};
use crate::models::{
    CompletedTransaction, GiftDefinition, Receiver, Transaction, TransactionStatus, User,
    UserProfile,
};
use crate::validation::validate_gift;

#[derive(Default)]
pub struct MemoryStore {
    gifts: DashMap<GiftId, GiftDefinition>,
    slugs: DashMap<String, GiftId>,
    transactions: DashMap<TransactionId, Transaction>,
    /// Unique payment id index
    payments: DashMap<PaymentId, TransactionId>,
    users: DashMap<UserId, User>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gift_count(&self) -> usize {
        self.gifts.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Snapshot of all transactions (tests, debugging)
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.transactions.iter().map(|e| e.value().clone()).collect()
    }

    /// Only an in-flight settlement may be undone
    fn revertible(tx: &Transaction) -> bool {
        tx.status == TransactionStatus::Completed && tx.which.is_none() && tx.receiver.is_unclaimed()
    }

    fn users_set(user: &mut User, set: UserSet) -> &mut std::collections::HashSet<TransactionId> {
        match set {
            UserSet::Gifts => &mut user.gifts,
            UserSet::PendingGifts => &mut user.pending_gifts,
            UserSet::Transactions => &mut user.transactions,
        }
    }
}

#[async_trait]
impl GiftCatalog for MemoryStore {
    async fn insert_gift(&self, gift: &GiftDefinition) -> StoreResult<()> {
        validate_gift(gift)?;

        match self.slugs.entry(gift.slug.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("slug '{}'", gift.slug))),
            Entry::Vacant(slot) => {
                if self.gifts.contains_key(&gift.id) {
                    return Err(StoreError::Conflict(format!("gift id {}", gift.id)));
                }
                self.gifts.insert(gift.id, gift.clone());
                slot.insert(gift.id);
                Ok(())
            }
        }
    }

    async fn get_gift(&self, id: GiftId) -> StoreResult<Option<GiftDefinition>> {
        Ok(self.gifts.get(&id).map(|g| g.clone()))
    }

    async fn get_gift_by_slug(&self, slug: &str) -> StoreResult<Option<GiftDefinition>> {
        let id = match self.slugs.get(slug) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_gift(id).await
    }

    async fn increment_sold_if_available(&self, id: GiftId) -> StoreResult<Option<u32>> {
        let Some(mut gift) = self.gifts.get_mut(&id) else {
            return Ok(None);
        };

        if gift.sold >= gift.total_available {
            return Ok(None);
        }
        gift.sold += 1;
        Ok(Some(gift.sold))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_pending(&self, tx: &Transaction) -> StoreResult<()> {
        match self.payments.entry(tx.payment_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "payment id {}",
                tx.payment_id
            ))),
            Entry::Vacant(slot) => {
                self.transactions.insert(tx.id, tx.clone());
                slot.insert(tx.id);
                Ok(())
            }
        }
    }

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn find_by_payment(&self, payment_id: PaymentId) -> StoreResult<Option<Transaction>> {
        let id = match self.payments.get(&payment_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_transaction(id).await
    }

    async fn upsert_completed(&self, values: &CompletedTransaction) -> StoreResult<UpsertOutcome> {
        match self.payments.entry(values.payment_id) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut tx = self.transactions.get_mut(&id).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "payment {} indexes missing transaction {}",
                        values.payment_id, id
                    ))
                })?;

                if tx.status == TransactionStatus::Completed {
                    return Ok(UpsertOutcome::AlreadyCompleted(tx.clone()));
                }

                let previous = tx.clone();
                tx.gift_id = values.gift_id;
                tx.sender_id = values.sender_id;
                tx.receiver = Receiver::Unclaimed;
                tx.status = TransactionStatus::Completed;
                tx.price = values.price;
                tx.currency = values.currency;
                tx.which = values.which;
                tx.created_at = values.paid_at;
                tx.updated_at = values.recorded_at;

                Ok(UpsertOutcome::Promoted {
                    transaction: tx.clone(),
                    previous,
                })
            }
            Entry::Vacant(slot) => {
                let tx = values.clone().into_transaction(TransactionId::new());
                self.transactions.insert(tx.id, tx.clone());
                slot.insert(tx.id);
                Ok(UpsertOutcome::Inserted(tx))
            }
        }
    }

    async fn set_ordinal(&self, id: TransactionId, which: u32) -> StoreResult<()> {
        if let Some(mut tx) = self.transactions.get_mut(&id) {
            tx.which = Some(which);
        }
        Ok(())
    }

    async fn take_over_unreserved(
        &self,
        id: TransactionId,
        seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut tx) = self.transactions.get_mut(&id) else {
            return Ok(false);
        };

        if tx.status != TransactionStatus::Completed || tx.which.is_some() || tx.updated_at != seen {
            return Ok(false);
        }
        tx.updated_at = now;
        Ok(true)
    }

    async fn revert(&self, revert: &Revert) -> StoreResult<()> {
        match revert {
            Revert::Delete { id, payment_id } => {
                if let Entry::Occupied(slot) = self.payments.entry(*payment_id)
                    && *slot.get() == *id
                    && self
                        .transactions
                        .remove_if(id, |_, tx| Self::revertible(tx))
                        .is_some()
                {
                    slot.remove();
                }
            }
            Revert::RestorePending(previous) => {
                if let Some(mut tx) = self.transactions.get_mut(&previous.id)
                    && Self::revertible(&tx)
                {
                    *tx = previous.clone();
                }
            }
        }
        Ok(())
    }

    async fn bind_receiver_if_unclaimed(
        &self,
        id: TransactionId,
        receiver: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut tx) = self.transactions.get_mut(&id) else {
            return Ok(false);
        };

        if !tx.is_settled() || !tx.receiver.is_unclaimed() {
            return Ok(false);
        }
        tx.receiver = Receiver::Bound(receiver);
        tx.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn upsert_profile(
        &self,
        id: UserId,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<User> {
        let mut user = self
            .users
            .entry(id)
            .or_insert_with(|| User::new(id, profile.clone(), now));

        if user.profile != *profile {
            user.profile = profile.clone();
            user.updated_at = now;
        }
        Ok(user.clone())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn add_to_sets(
        &self,
        id: UserId,
        sets: &[UserSet],
        tx: TransactionId,
        on_insert: &UserProfile,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut user = self
            .users
            .entry(id)
            .or_insert_with(|| User::new(id, on_insert.clone(), now));

        for set in sets {
            Self::users_set(&mut user, *set).insert(tx);
        }
        user.updated_at = now;
        Ok(())
    }

    async fn remove_from_set(
        &self,
        id: UserId,
        set: UserSet,
        tx: TransactionId,
    ) -> StoreResult<()> {
        if let Some(mut user) = self.users.get_mut(&id) {
            Self::users_set(&mut user, set).remove(&tx);
        }
        Ok(())
    }

    async fn recompute_gift_count(&self, id: UserId) -> StoreResult<u32> {
        let Some(mut user) = self.users.get_mut(&id) else {
            return Ok(0);
        };
        user.total_gifts_count = user.gifts.len() as u32;
        Ok(user.total_gifts_count)
    }
}
