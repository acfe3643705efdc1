//! Claim protocol
//!
//! Steps after the receiver bind are idempotent set operations. If one of them
//! fails, the bound receiver's next claim call re-applies them on the read path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{ClaimError, ClaimOutcome, TransactionView};
use crate::core_types::{TransactionId, UserId};
use crate::models::{Receiver, Transaction, UserProfile, UserSummary};
use crate::notify::{NotificationDispatcher, messages};
use crate::store::{GiftCatalog, StoreError, Stores, TransactionStore, UserDirectory, UserSet};

/// Name given to a claimer with no profile on record
const UNKNOWN_FIRST_NAME: &str = "Unknown";

pub struct TransferProtocol {
    gifts: Arc<dyn GiftCatalog>,
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: NotificationDispatcher,
    webapp_url: Option<String>,
}

impl TransferProtocol {
    pub fn new(
        stores: &Stores,
        dispatcher: NotificationDispatcher,
        webapp_url: Option<String>,
    ) -> Self {
        Self {
            gifts: stores.gifts.clone(),
            transactions: stores.transactions.clone(),
            users: stores.users.clone(),
            dispatcher,
            webapp_url,
        }
    }

    /// Bind `claimer` as receiver of `tx_id` if nobody has claimed it yet.
    pub async fn claim(
        &self,
        tx_id: TransactionId,
        expected_sender: UserId,
        claimer: UserId,
    ) -> Result<ClaimOutcome, ClaimError> {
        // 1. Lookup + preconditions
        let tx = self
            .transactions
            .get_transaction(tx_id)
            .await?
            .filter(|t| t.is_settled() && t.sender_id == expected_sender)
            .ok_or(ClaimError::TransactionNotFound(tx_id))?;

        // 2. Read path
        if !tx.receiver.is_unclaimed() {
            debug!(transaction_id = %tx_id, "Already claimed, read path");
            return self.read_path(tx, claimer).await;
        }

        // 3a. Guarded bind
        let now = Utc::now();
        if !self
            .transactions
            .bind_receiver_if_unclaimed(tx_id, claimer, now)
            .await?
        {
            info!(
                transaction_id = %tx_id,
                user_id = claimer,
                "Lost claim race, falling back to read path"
            );
            let current = self
                .transactions
                .get_transaction(tx_id)
                .await?
                .ok_or(ClaimError::TransactionNotFound(tx_id))?;
            return self.read_path(current, claimer).await;
        }

        let count = self.move_sets(&tx, claimer, now).await?;

        info!(
            transaction_id = %tx_id,
            gift_id = %tx.gift_id,
            sender_id = tx.sender_id,
            user_id = claimer,
            total_gifts_count = count,
            "Gift claimed"
        );

        let current = self
            .transactions
            .get_transaction(tx_id)
            .await?
            .ok_or(ClaimError::TransactionNotFound(tx_id))?;
        let view = self.view(current).await?;

        // 3e. Both parties, independently
        self.notify_parties(&view, claimer);

        Ok(ClaimOutcome::Claimed(view))
    }

    /// No mutation, except finishing the set updates of an interrupted first
    /// claim when `claimer` is the bound receiver. Never notifies.
    async fn read_path(
        &self,
        tx: Transaction,
        claimer: UserId,
    ) -> Result<ClaimOutcome, ClaimError> {
        if tx.receiver == Receiver::Bound(claimer) && !self.sets_moved(&tx, claimer).await? {
            info!(
                transaction_id = %tx.id,
                user_id = claimer,
                "Finishing interrupted claim"
            );
            self.move_sets(&tx, claimer, Utc::now()).await?;
        }
        Ok(ClaimOutcome::AlreadyClaimed(self.view(tx).await?))
    }

    /// Steps 3b to 3d, each idempotent. Returns the claimer's gift count.
    async fn move_sets(
        &self,
        tx: &Transaction,
        claimer: UserId,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        // 3b. Claimer owns it
        self.users
            .add_to_sets(
                claimer,
                &[UserSet::Gifts, UserSet::Transactions],
                tx.id,
                &UserProfile::with_first_name(UNKNOWN_FIRST_NAME),
                now,
            )
            .await?;

        // 3c. Recompute, never increment
        let count = self.users.recompute_gift_count(claimer).await?;

        // 3d. No longer pending for the buyer
        self.users
            .remove_from_set(tx.sender_id, UserSet::PendingGifts, tx.id)
            .await?;

        Ok(count)
    }

    async fn sets_moved(&self, tx: &Transaction, claimer: UserId) -> Result<bool, StoreError> {
        let owned = self.users.get_user(claimer).await?.is_some_and(|u| {
            u.gifts.contains(&tx.id)
                && u.transactions.contains(&tx.id)
                && u.total_gifts_count as usize == u.gifts.len()
        });
        if !owned {
            return Ok(false);
        }
        let still_pending = self
            .users
            .get_user(tx.sender_id)
            .await?
            .is_some_and(|u| u.pending_gifts.contains(&tx.id));
        Ok(!still_pending)
    }

    fn notify_parties(&self, view: &TransactionView, claimer: UserId) {
        let gift_name = &view.gift.name;
        self.dispatcher.dispatch(messages::gift_received(
            claimer,
            gift_name,
            view.sender.as_ref(),
            self.webapp_url.as_deref(),
        ));
        self.dispatcher.dispatch(messages::gift_delivered(
            view.transaction.sender_id,
            gift_name,
            view.receiver.as_ref(),
        ));
    }

    /// Join gift and both parties onto the transaction
    async fn view(&self, transaction: Transaction) -> Result<TransactionView, ClaimError> {
        let gift = self
            .gifts
            .get_gift(transaction.gift_id)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "transaction {} references missing gift {}",
                    transaction.id, transaction.gift_id
                ))
            })?;

        let sender = self.summary(Some(transaction.sender_id)).await?;
        let receiver = self.summary(transaction.receiver.user_id()).await?;

        Ok(TransactionView {
            transaction,
            gift,
            sender,
            receiver,
        })
    }

    async fn summary(&self, id: Option<UserId>) -> Result<Option<UserSummary>, StoreError> {
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(self.users.get_user(id).await?.map(|u| u.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::GiftId;
    use crate::models::{CompletedTransaction, Currency, GiftDefinition, TransactionStatus};
    use crate::notify::mock::RecordingNotifier;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    const SENDER: UserId = 1001;

    struct Harness {
        protocol: TransferProtocol,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let (stores, store) = Stores::memory();
        let notifier = Arc::new(RecordingNotifier::default());
        let protocol = TransferProtocol::new(
            &stores,
            NotificationDispatcher::new(notifier.clone()),
            Some("https://app.example".into()),
        );
        Harness {
            protocol,
            store,
            notifier,
        }
    }

    /// A settled, unclaimed transaction owned by `SENDER`
    async fn settled_tx(store: &MemoryStore) -> Transaction {
        let gift = GiftDefinition {
            id: GiftId::new(),
            name: "Rose".into(),
            slug: format!("rose-{}", rand::random::<u32>()),
            price: Decimal::new(1, 0),
            currency: Currency::Ton,
            total_available: 10,
            sold: 1,
            color: "#ff0000".into(),
            pattern_id: "rose".into(),
            lottie_id: "rose".into(),
        };
        store.insert_gift(&gift).await.unwrap();

        let tx = store
            .upsert_completed(&CompletedTransaction {
                payment_id: rand::random::<u32>() as i64,
                gift_id: gift.id,
                sender_id: SENDER,
                price: gift.price,
                currency: gift.currency,
                paid_at: Utc::now(),
                recorded_at: Utc::now(),
                which: Some(1),
            })
            .await
            .unwrap()
            .transaction()
            .clone();

        store
            .add_to_sets(
                SENDER,
                &[UserSet::PendingGifts, UserSet::Transactions],
                tx.id,
                &UserProfile::with_first_name("Sam"),
                Utc::now(),
            )
            .await
            .unwrap();
        tx
    }

    #[tokio::test]
    async fn test_first_claim_binds_and_moves_sets() {
        let h = harness();
        let tx = settled_tx(&h.store).await;

        let outcome = h.protocol.claim(tx.id, SENDER, 2002).await.unwrap();
        assert!(outcome.is_first_claim());
        let view = outcome.view();
        assert_eq!(view.transaction.receiver, Receiver::Bound(2002));
        assert_eq!(view.sender.as_ref().unwrap().first_name, "Sam");
        assert_eq!(view.receiver.as_ref().unwrap().total_gifts_count, 1);

        let claimer = h.store.get_user(2002).await.unwrap().unwrap();
        assert!(claimer.gifts.contains(&tx.id));
        assert!(claimer.transactions.contains(&tx.id));
        assert_eq!(claimer.total_gifts_count, 1);

        let sender = h.store.get_user(SENDER).await.unwrap().unwrap();
        assert!(!sender.pending_gifts.contains(&tx.id));
        assert!(sender.transactions.contains(&tx.id));
    }

    #[tokio::test]
    async fn test_sender_mismatch_is_not_found() {
        let h = harness();
        let tx = settled_tx(&h.store).await;

        let err = h.protocol.claim(tx.id, 9999, 2002).await.unwrap_err();
        assert!(matches!(err, ClaimError::TransactionNotFound(id) if id == tx.id));
        assert_eq!(
            h.store.get_transaction(tx.id).await.unwrap().unwrap().receiver,
            Receiver::Unclaimed
        );
    }

    #[tokio::test]
    async fn test_pending_transaction_is_not_claimable() {
        let h = harness();
        let gift_tx = settled_tx(&h.store).await;
        let now = Utc::now();
        let pending = Transaction {
            id: TransactionId::new(),
            status: TransactionStatus::Pending,
            payment_id: gift_tx.payment_id + 1,
            created_at: now,
            updated_at: now,
            which: None,
            ..gift_tx
        };
        h.store.insert_pending(&pending).await.unwrap();

        assert!(matches!(
            h.protocol.claim(pending.id, SENDER, 2002).await,
            Err(ClaimError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let h = harness();
        assert!(matches!(
            h.protocol.claim(TransactionId::new(), SENDER, 2002).await,
            Err(ClaimError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_claim_reads_only() {
        let h = harness();
        let tx = settled_tx(&h.store).await;
        h.protocol.claim(tx.id, SENDER, 2002).await.unwrap();

        let outcome = h.protocol.claim(tx.id, SENDER, 3003).await.unwrap();
        assert!(!outcome.is_first_claim());
        assert_eq!(outcome.view().transaction.receiver, Receiver::Bound(2002));
        assert!(h.store.get_user(3003).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_notifies_both_parties() {
        let h = harness();
        let tx = settled_tx(&h.store).await;
        h.protocol.claim(tx.id, SENDER, 2002).await.unwrap();

        for _ in 0..50 {
            if h.notifier.sent().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let mut chats: Vec<_> = h.notifier.sent().iter().map(|n| n.chat_id).collect();
        chats.sort();
        assert_eq!(chats, vec![SENDER, 2002]);
    }

    /// Users whose first `add_to_sets` call fails
    struct FlakyUsers {
        inner: Arc<MemoryStore>,
        failed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl UserDirectory for FlakyUsers {
        async fn upsert_profile(
            &self,
            id: UserId,
            profile: &UserProfile,
            now: DateTime<Utc>,
        ) -> crate::store::StoreResult<crate::models::User> {
            self.inner.upsert_profile(id, profile, now).await
        }

        async fn get_user(&self, id: UserId) -> crate::store::StoreResult<Option<crate::models::User>> {
            self.inner.get_user(id).await
        }

        async fn add_to_sets(
            &self,
            id: UserId,
            sets: &[UserSet],
            tx: TransactionId,
            on_insert: &UserProfile,
            now: DateTime<Utc>,
        ) -> crate::store::StoreResult<()> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.add_to_sets(id, sets, tx, on_insert, now).await
        }

        async fn remove_from_set(
            &self,
            id: UserId,
            set: UserSet,
            tx: TransactionId,
        ) -> crate::store::StoreResult<()> {
            self.inner.remove_from_set(id, set, tx).await
        }

        async fn recompute_gift_count(&self, id: UserId) -> crate::store::StoreResult<u32> {
            self.inner.recompute_gift_count(id).await
        }
    }

    #[tokio::test]
    async fn test_retry_finishes_interrupted_claim() {
        let store = Arc::new(MemoryStore::new());
        let tx = settled_tx(&store).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let stores = Stores {
            gifts: store.clone(),
            transactions: store.clone(),
            users: Arc::new(FlakyUsers {
                inner: store.clone(),
                failed: Default::default(),
            }),
        };
        let protocol =
            TransferProtocol::new(&stores, NotificationDispatcher::new(notifier.clone()), None);

        // Bound, then the claimer's set update fails
        let err = protocol.claim(tx.id, SENDER, 2002).await.unwrap_err();
        assert!(matches!(err, ClaimError::Storage(StoreError::Unavailable(_))));
        assert_eq!(
            store.get_transaction(tx.id).await.unwrap().unwrap().receiver,
            Receiver::Bound(2002)
        );

        let outcome = protocol.claim(tx.id, SENDER, 2002).await.unwrap();
        assert!(!outcome.is_first_claim());

        let claimer = store.get_user(2002).await.unwrap().unwrap();
        assert!(claimer.gifts.contains(&tx.id));
        assert!(claimer.transactions.contains(&tx.id));
        assert_eq!(claimer.total_gifts_count, 1);
        let sender = store.get_user(SENDER).await.unwrap().unwrap();
        assert!(!sender.pending_gifts.contains(&tx.id));

        // Someone else opening it afterwards changes nothing
        protocol.claim(tx.id, SENDER, 3003).await.unwrap();
        assert!(store.get_user(3003).await.unwrap().is_none());

        tokio::task::yield_now().await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unreserved_transaction_is_not_claimable() {
        let h = harness();
        let settled = settled_tx(&h.store).await;
        let in_flight = h
            .store
            .upsert_completed(&CompletedTransaction {
                payment_id: settled.payment_id + 1,
                gift_id: settled.gift_id,
                sender_id: SENDER,
                price: settled.price,
                currency: settled.currency,
                paid_at: Utc::now(),
                recorded_at: Utc::now(),
                which: None,
            })
            .await
            .unwrap()
            .transaction()
            .clone();

        assert!(matches!(
            h.protocol.claim(in_flight.id, SENDER, 2002).await,
            Err(ClaimError::TransactionNotFound(_))
        ));
        assert_eq!(
            h.store.get_transaction(in_flight.id).await.unwrap().unwrap().receiver,
            Receiver::Unclaimed
        );
    }
}
