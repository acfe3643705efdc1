//! Settlement engine
//!
//! Stateless over the stores: every step is a single-document conditional
//! operation, so concurrent and duplicated webhook deliveries are safe without
//! any in-process lock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use super::{PaymentCompletedEvent, SettlementError, SettlementOutcome};
use crate::models::{CompletedTransaction, GiftDefinition, Transaction, UserProfile};
use crate::notify::{NotificationDispatcher, messages};
use crate::store::{
    GiftCatalog, Revert, StoreError, Stores, TransactionStore, UpsertOutcome, UserDirectory,
    UserSet,
};

/// Name given to a buyer first seen through a webhook without a `firstName`
const UNKNOWN_FIRST_NAME: &str = "Unknown";

/// Attempts for a compensating write before giving up
const REVERT_ATTEMPTS: usize = 3;

/// How long a recorded but unreserved settlement is left to its owner before
/// a redelivery may take it over. Must exceed the webhook request timeout.
const RESERVATION_LEASE_SECS: i64 = 120;

pub struct SettlementEngine {
    gifts: Arc<dyn GiftCatalog>,
    transactions: Arc<dyn TransactionStore>,
    users: Arc<dyn UserDirectory>,
    dispatcher: NotificationDispatcher,
    webapp_url: Option<String>,
}

impl SettlementEngine {
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

    /// Settle a verified payment. Safe to call any number of times per payment id.
    pub async fn settle(
        &self,
        event: &PaymentCompletedEvent,
    ) -> Result<SettlementOutcome, SettlementError> {
        // 1. Idempotency
        if let Some(existing) = self
            .transactions
            .find_completed_by_payment(event.payment_id)
            .await?
        {
            return self.resume(event, existing).await;
        }

        // 2. Gift & capacity (advisory; the guarded increment decides)
        let gift = self
            .gifts
            .get_gift(event.gift_id)
            .await?
            .ok_or(SettlementError::GiftNotFound(event.gift_id))?;

        if !gift.has_capacity() {
            info!(payment_id = event.payment_id, gift_id = %gift.id, "Gift sold out");
            return Err(SettlementError::SoldOut(gift.id));
        }

        // 3. Create-or-promote keyed by payment id. No ordinal yet: the record
        // only counts as settled once step 4 has reserved its unit.
        let values = CompletedTransaction {
            payment_id: event.payment_id,
            gift_id: gift.id,
            sender_id: event.buyer_id,
            price: gift.price,
            currency: gift.currency,
            paid_at: event.paid_at,
            recorded_at: Utc::now(),
            which: None,
        };

        let upserted = self.transactions.upsert_completed(&values).await?;
        let revert = match &upserted {
            UpsertOutcome::AlreadyCompleted(existing) => {
                // A concurrent delivery of the same payment won the upsert
                return self.resume(event, existing.clone()).await;
            }
            other => other.revert(),
        };

        self.reserve(event, &gift, upserted.transaction().clone(), revert)
            .await
    }

    /// A COMPLETED record already carries this payment id.
    ///
    /// Settled records are acknowledged. In-flight ones are reported as such
    /// until their lease runs out; after that one caller takes the settlement
    /// over from step 4.
    async fn resume(
        &self,
        event: &PaymentCompletedEvent,
        existing: Transaction,
    ) -> Result<SettlementOutcome, SettlementError> {
        if existing.is_settled() {
            info!(
                payment_id = event.payment_id,
                transaction_id = %existing.id,
                "Payment already settled"
            );
            self.repair_buyer_credit(event, &existing).await?;
            return Ok(SettlementOutcome::AlreadySettled {
                transaction: existing,
            });
        }

        let now = Utc::now();
        let lease_expired = now - existing.updated_at >= Duration::seconds(RESERVATION_LEASE_SECS);
        if !lease_expired
            || !self
                .transactions
                .take_over_unreserved(existing.id, existing.updated_at, now)
                .await?
        {
            info!(
                payment_id = event.payment_id,
                transaction_id = %existing.id,
                "Settlement in flight"
            );
            return Err(SettlementError::InFlight(event.payment_id));
        }

        warn!(
            payment_id = event.payment_id,
            transaction_id = %existing.id,
            stalled_since = %existing.updated_at,
            "Taking over stalled settlement"
        );
        let gift = self
            .gifts
            .get_gift(existing.gift_id)
            .await?
            .ok_or(SettlementError::GiftNotFound(existing.gift_id))?;
        let revert = Some(Revert::Delete {
            id: existing.id,
            payment_id: existing.payment_id,
        });
        let existing = Transaction {
            updated_at: now,
            ..existing
        };
        self.reserve(event, &gift, existing, revert).await
    }

    /// Steps 4 to 6 for a record this call owns
    async fn reserve(
        &self,
        event: &PaymentCompletedEvent,
        gift: &GiftDefinition,
        transaction: Transaction,
        revert: Option<Revert>,
    ) -> Result<SettlementOutcome, SettlementError> {
        // 4. Guarded capacity increment
        let Some(sold) = self.gifts.increment_sold_if_available(gift.id).await? else {
            warn!(
                payment_id = event.payment_id,
                gift_id = %gift.id,
                transaction_id = %transaction.id,
                "Lost capacity race, reverting transaction"
            );
            if let Some(revert) = revert {
                self.compensate(&revert).await?;
            }
            return Err(SettlementError::SoldOut(gift.id));
        };

        let transaction = self.finalize(transaction, gift, sold, event).await?;

        info!(
            payment_id = event.payment_id,
            gift_id = %gift.id,
            transaction_id = %transaction.id,
            user_id = event.buyer_id,
            sold,
            "Payment settled"
        );

        // 6. Best-effort notify
        self.dispatcher.dispatch(messages::purchase_success(
            event.buyer_id,
            &gift.name,
            self.webapp_url.as_deref(),
        ));

        Ok(SettlementOutcome::Settled { transaction, sold })
    }

    /// Steps after the unit is reserved: ordinal (marks the record settled),
    /// then buyer credit (5)
    async fn finalize(
        &self,
        mut transaction: Transaction,
        gift: &GiftDefinition,
        sold: u32,
        event: &PaymentCompletedEvent,
    ) -> Result<Transaction, SettlementError> {
        self.transactions
            .set_ordinal(transaction.id, sold)
            .await
            .inspect_err(|e| {
                error!(
                    payment_id = event.payment_id,
                    gift_id = %gift.id,
                    transaction_id = %transaction.id,
                    sold,
                    error = %e,
                    "Unit reserved but ordinal not recorded"
                )
            })?;
        transaction.which = Some(sold);

        self.users
            .add_to_sets(
                transaction.sender_id,
                &[UserSet::PendingGifts, UserSet::Transactions],
                transaction.id,
                &buyer_profile(event),
                event.paid_at,
            )
            .await
            .inspect_err(|e| {
                error!(
                    payment_id = event.payment_id,
                    gift_id = %gift.id,
                    transaction_id = %transaction.id,
                    user_id = transaction.sender_id,
                    error = %e,
                    "Unit reserved but buyer credit failed"
                )
            })?;

        Ok(transaction)
    }

    /// Redelivery after a failed step 5 finds the payment settled but the
    /// buyer never credited. Set-adds are idempotent, so re-applying is safe.
    async fn repair_buyer_credit(
        &self,
        event: &PaymentCompletedEvent,
        existing: &Transaction,
    ) -> Result<(), StoreError> {
        let credited = self
            .users
            .get_user(existing.sender_id)
            .await?
            .is_some_and(|u| u.transactions.contains(&existing.id));
        if credited {
            return Ok(());
        }

        let sets: &[UserSet] = if existing.receiver.is_unclaimed() {
            &[UserSet::PendingGifts, UserSet::Transactions]
        } else {
            &[UserSet::Transactions]
        };

        warn!(
            payment_id = event.payment_id,
            transaction_id = %existing.id,
            user_id = existing.sender_id,
            "Re-applying missing buyer credit"
        );
        self.users
            .add_to_sets(
                existing.sender_id,
                sets,
                existing.id,
                &buyer_profile(event),
                Utc::now(),
            )
            .await
    }

    async fn compensate(&self, revert: &Revert) -> Result<(), StoreError> {
        let mut last_err = None;
        for attempt in 1..=REVERT_ATTEMPTS {
            match self.transactions.revert(revert).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, ?revert, "Compensating write failed");
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| StoreError::Database("revert not attempted".into()));
        error!(?revert, error = %err, "Dangling settlement record, manual repair needed");
        Err(err)
    }
}

fn buyer_profile(event: &PaymentCompletedEvent) -> UserProfile {
    UserProfile::with_first_name(
        event
            .buyer_first_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_FIRST_NAME.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::GiftId;
    use crate::models::{Currency, Receiver, TransactionStatus};
    use crate::notify::mock::RecordingNotifier;
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    struct Harness {
        engine: SettlementEngine,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let (stores, store) = Stores::memory();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = SettlementEngine::new(
            &stores,
            NotificationDispatcher::new(notifier.clone()),
            Some("https://app.example".into()),
        );
        Harness {
            engine,
            store,
            notifier,
        }
    }

    async fn seed_gift(store: &MemoryStore, total: u32, sold: u32) -> GiftDefinition {
        let gift = GiftDefinition {
            id: GiftId::new(),
            name: "Cake".into(),
            slug: format!("cake-{}", rand::random::<u32>()),
            price: Decimal::new(250, 2),
            currency: Currency::Usdt,
            total_available: total,
            sold,
            color: "#ff00aa".into(),
            pattern_id: "cake".into(),
            lottie_id: "cake".into(),
        };
        store.insert_gift(&gift).await.unwrap();
        gift
    }

    fn event(payment_id: i64, gift_id: GiftId, buyer_id: i64) -> PaymentCompletedEvent {
        PaymentCompletedEvent {
            payment_id,
            paid_at: Utc::now(),
            gift_id,
            buyer_id,
            buyer_first_name: Some("Ann".into()),
        }
    }

    #[tokio::test]
    async fn test_settle_credits_buyer() {
        let h = harness();
        let gift = seed_gift(&h.store, 5, 2).await;

        let outcome = h.engine.settle(&event(1, gift.id, 100)).await.unwrap();
        let SettlementOutcome::Settled { transaction, sold } = outcome else {
            panic!("expected Settled");
        };
        assert_eq!(sold, 3);
        assert_eq!(transaction.which, Some(3));
        assert_eq!(transaction.status, TransactionStatus::Completed);
        assert_eq!(transaction.receiver, Receiver::Unclaimed);
        assert_eq!(transaction.price, gift.price);

        let buyer = h.store.get_user(100).await.unwrap().unwrap();
        assert_eq!(buyer.profile.first_name, "Ann");
        assert!(buyer.pending_gifts.contains(&transaction.id));
        assert!(buyer.transactions.contains(&transaction.id));
        assert!(buyer.gifts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_gift() {
        let h = harness();
        let missing = GiftId::new();
        let err = h.engine.settle(&event(1, missing, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::GiftNotFound(id) if id == missing));
        assert_eq!(h.store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_promotes_pending_invoice() {
        let h = harness();
        let gift = seed_gift(&h.store, 2, 0).await;

        let now = Utc::now();
        let pending = Transaction {
            id: crate::core_types::TransactionId::new(),
            gift_id: gift.id,
            sender_id: 100,
            receiver: Receiver::Unclaimed,
            status: TransactionStatus::Pending,
            payment_id: 77,
            price: gift.price,
            currency: gift.currency,
            created_at: now,
            updated_at: now,
            which: None,
        };
        h.store.insert_pending(&pending).await.unwrap();

        let outcome = h.engine.settle(&event(77, gift.id, 100)).await.unwrap();
        assert_eq!(outcome.transaction().id, pending.id);
        assert_eq!(h.store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_sold_out_creates_nothing() {
        let h = harness();
        let gift = seed_gift(&h.store, 1, 1).await;

        let err = h.engine.settle(&event(9, gift.id, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::SoldOut(_)));
        assert!(h.store.find_by_payment(9).await.unwrap().is_none());
    }

    /// Catalog whose reads always report free capacity, so the guarded
    /// increment is the only thing standing between us and oversell.
    struct StaleCatalog(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl GiftCatalog for StaleCatalog {
        async fn insert_gift(&self, gift: &GiftDefinition) -> crate::store::StoreResult<()> {
            self.0.insert_gift(gift).await
        }

        async fn get_gift(&self, id: GiftId) -> crate::store::StoreResult<Option<GiftDefinition>> {
            Ok(self.0.get_gift(id).await?.map(|mut g| {
                g.sold = 0;
                g
            }))
        }

        async fn get_gift_by_slug(
            &self,
            slug: &str,
        ) -> crate::store::StoreResult<Option<GiftDefinition>> {
            self.0.get_gift_by_slug(slug).await
        }

        async fn increment_sold_if_available(
            &self,
            id: GiftId,
        ) -> crate::store::StoreResult<Option<u32>> {
            self.0.increment_sold_if_available(id).await
        }
    }

    fn stale_engine(store: &Arc<MemoryStore>) -> SettlementEngine {
        let stores = Stores {
            gifts: Arc::new(StaleCatalog(store.clone())),
            transactions: store.clone(),
            users: store.clone(),
        };
        SettlementEngine::new(
            &stores,
            NotificationDispatcher::new(Arc::new(RecordingNotifier::default())),
            None,
        )
    }

    #[tokio::test]
    async fn test_lost_race_deletes_inserted_record() {
        let store = Arc::new(MemoryStore::new());
        let engine = stale_engine(&store);
        let gift = seed_gift(&store, 1, 1).await;

        let err = engine.settle(&event(9, gift.id, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::SoldOut(_)));
        assert!(store.find_by_payment(9).await.unwrap().is_none());
        assert!(store.get_user(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lost_race_restores_pending_invoice() {
        let store = Arc::new(MemoryStore::new());
        let engine = stale_engine(&store);
        let gift = seed_gift(&store, 1, 1).await;

        let now = Utc::now();
        let pending = Transaction {
            id: crate::core_types::TransactionId::new(),
            gift_id: gift.id,
            sender_id: 100,
            receiver: Receiver::Unclaimed,
            status: TransactionStatus::Pending,
            payment_id: 10,
            price: gift.price,
            currency: gift.currency,
            created_at: now,
            updated_at: now,
            which: None,
        };
        store.insert_pending(&pending).await.unwrap();

        let err = engine.settle(&event(10, gift.id, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::SoldOut(_)));
        assert_eq!(store.find_by_payment(10).await.unwrap(), Some(pending));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_settlement() {
        let (stores, store) = Stores::memory();
        let notifier = Arc::new(RecordingNotifier::failing());
        let engine = SettlementEngine::new(&stores, NotificationDispatcher::new(notifier), None);
        let gift = seed_gift(&store, 1, 0).await;

        assert!(engine.settle(&event(1, gift.id, 5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_purchase_notification_dispatched() {
        let h = harness();
        let gift = seed_gift(&h.store, 1, 0).await;
        h.engine.settle(&event(3, gift.id, 42)).await.unwrap();

        for _ in 0..50 {
            if !h.notifier.sent().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 42);
        assert!(sent[0].text.contains("<b>Cake</b>"));
    }

    #[tokio::test]
    async fn test_missing_first_name_defaults() {
        let h = harness();
        let gift = seed_gift(&h.store, 1, 0).await;
        let mut ev = event(4, gift.id, 8);
        ev.buyer_first_name = None;
        h.engine.settle(&ev).await.unwrap();

        let buyer = h.store.get_user(8).await.unwrap().unwrap();
        assert_eq!(buyer.profile.first_name, "Unknown");
    }

    #[tokio::test]
    async fn test_redelivery_repairs_missing_credit() {
        let h = harness();
        let gift = seed_gift(&h.store, 3, 0).await;

        // A settled record whose buyer credit never landed
        let values = CompletedTransaction {
            payment_id: 11,
            gift_id: gift.id,
            sender_id: 55,
            price: gift.price,
            currency: gift.currency,
            paid_at: Utc::now(),
            recorded_at: Utc::now(),
            which: Some(1),
        };
        let tx = h.store.upsert_completed(&values).await.unwrap().transaction().clone();

        let outcome = h.engine.settle(&event(11, gift.id, 55)).await.unwrap();
        assert!(outcome.is_already_settled());

        let buyer = h.store.get_user(55).await.unwrap().unwrap();
        assert!(buyer.pending_gifts.contains(&tx.id));
        assert!(buyer.transactions.contains(&tx.id));
    }

    /// Catalog that parks every guarded increment until released
    struct GatedCatalog {
        inner: Arc<MemoryStore>,
        reached: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl GiftCatalog for GatedCatalog {
        async fn insert_gift(&self, gift: &GiftDefinition) -> crate::store::StoreResult<()> {
            self.inner.insert_gift(gift).await
        }

        async fn get_gift(&self, id: GiftId) -> crate::store::StoreResult<Option<GiftDefinition>> {
            self.inner.get_gift(id).await
        }

        async fn get_gift_by_slug(
            &self,
            slug: &str,
        ) -> crate::store::StoreResult<Option<GiftDefinition>> {
            self.inner.get_gift_by_slug(slug).await
        }

        async fn increment_sold_if_available(
            &self,
            id: GiftId,
        ) -> crate::store::StoreResult<Option<u32>> {
            self.reached.notify_one();
            self.release.notified().await;
            self.inner.increment_sold_if_available(id).await
        }
    }

    fn gated_engine(store: &Arc<MemoryStore>) -> (Arc<SettlementEngine>, Arc<GatedCatalog>) {
        let gate = Arc::new(GatedCatalog {
            inner: store.clone(),
            reached: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let stores = Stores {
            gifts: gate.clone(),
            transactions: store.clone(),
            users: store.clone(),
        };
        let engine = SettlementEngine::new(
            &stores,
            NotificationDispatcher::new(Arc::new(RecordingNotifier::default())),
            None,
        );
        (Arc::new(engine), gate)
    }

    #[tokio::test]
    async fn test_redelivery_before_reservation_is_in_flight() {
        let store = Arc::new(MemoryStore::new());
        let (engine, gate) = gated_engine(&store);
        let gift = seed_gift(&store, 1, 0).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.settle(&event(9, gift.id, 100)).await })
        };
        gate.reached.notified().await;

        // Recorded, not reserved: neither acknowledged nor credited
        let err = engine.settle(&event(9, gift.id, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::InFlight(9)));
        assert!(store.get_user(100).await.unwrap().is_none());

        // The last unit goes elsewhere while the first delivery is parked
        assert_eq!(store.increment_sold_if_available(gift.id).await.unwrap(), Some(1));
        gate.release.notify_one();
        assert!(matches!(first.await.unwrap(), Err(SettlementError::SoldOut(_))));

        assert!(store.find_by_payment(9).await.unwrap().is_none());
        assert!(store.get_user(100).await.unwrap().is_none());
        assert!(matches!(
            engine.settle(&event(9, gift.id, 100)).await,
            Err(SettlementError::SoldOut(_))
        ));
    }

    #[tokio::test]
    async fn test_redelivery_after_reservation_is_acknowledged() {
        let store = Arc::new(MemoryStore::new());
        let (engine, gate) = gated_engine(&store);
        let gift = seed_gift(&store, 1, 0).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.settle(&event(9, gift.id, 100)).await })
        };
        gate.reached.notified().await;
        assert!(matches!(
            engine.settle(&event(9, gift.id, 100)).await,
            Err(SettlementError::InFlight(_))
        ));

        gate.release.notify_one();
        let settled = first.await.unwrap().unwrap();
        assert!(!settled.is_already_settled());

        let again = engine.settle(&event(9, gift.id, 100)).await.unwrap();
        assert!(again.is_already_settled());
        assert_eq!(again.transaction().which, Some(1));
        let buyer = store.get_user(100).await.unwrap().unwrap();
        assert_eq!(buyer.pending_gifts.len(), 1);
    }

    /// A record left unreserved by a settlement that died before step 4
    async fn stalled_record(store: &MemoryStore, gift: &GiftDefinition, payment_id: i64) -> Transaction {
        let long_ago = Utc::now() - Duration::seconds(RESERVATION_LEASE_SECS + 60);
        store
            .upsert_completed(&CompletedTransaction {
                payment_id,
                gift_id: gift.id,
                sender_id: 100,
                price: gift.price,
                currency: gift.currency,
                paid_at: long_ago,
                recorded_at: long_ago,
                which: None,
            })
            .await
            .unwrap()
            .transaction()
            .clone()
    }

    #[tokio::test]
    async fn test_stalled_settlement_is_taken_over() {
        let h = harness();
        let gift = seed_gift(&h.store, 2, 0).await;
        let stalled = stalled_record(&h.store, &gift, 21).await;

        let outcome = h.engine.settle(&event(21, gift.id, 100)).await.unwrap();
        let SettlementOutcome::Settled { transaction, sold } = outcome else {
            panic!("expected Settled");
        };
        assert_eq!((transaction.id, sold), (stalled.id, 1));
        assert_eq!(transaction.which, Some(1));
        assert!(h.store.get_user(100).await.unwrap().unwrap().pending_gifts.contains(&stalled.id));
        assert!(h.engine.settle(&event(21, gift.id, 100)).await.unwrap().is_already_settled());
    }

    #[tokio::test]
    async fn test_stalled_settlement_without_capacity_is_removed() {
        let h = harness();
        let gift = seed_gift(&h.store, 1, 1).await;
        stalled_record(&h.store, &gift, 22).await;

        assert!(matches!(
            h.engine.settle(&event(22, gift.id, 100)).await,
            Err(SettlementError::SoldOut(_))
        ));
        assert!(h.store.find_by_payment(22).await.unwrap().is_none());
        assert!(h.store.get_user(100).await.unwrap().is_none());
    }
}
