//! Shared fixtures for the scenario tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use giftpay::claim::TransferProtocol;
use giftpay::core_types::{GiftId, PaymentId, TransactionId, UserId};
use giftpay::models::{Currency, GiftDefinition};
use giftpay::notify::{InlineArticle, Notification, NotificationDispatcher, Notifier, NotifyError};
use giftpay::settlement::{PaymentCompletedEvent, SettlementEngine};
use giftpay::store::{GiftCatalog, MemoryStore, Stores};

/// Notifier that only records chat ids
#[derive(Default)]
pub struct CountingNotifier {
    pub chats: Mutex<Vec<UserId>>,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.chats.lock().unwrap().push(notification.chat_id);
        Ok(())
    }

    async fn answer_inline_query(&self, _: &str, _: &[InlineArticle]) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub struct World {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<SettlementEngine>,
    pub protocol: Arc<TransferProtocol>,
    pub notifier: Arc<CountingNotifier>,
}

pub fn world() -> World {
    let (stores, store) = Stores::memory();
    let notifier = Arc::new(CountingNotifier::default());
    let dispatcher = NotificationDispatcher::new(notifier.clone());
    let webapp = Some("https://t.me/giftbot/app".to_string());
    World {
        store,
        engine: Arc::new(SettlementEngine::new(&stores, dispatcher.clone(), webapp.clone())),
        protocol: Arc::new(TransferProtocol::new(&stores, dispatcher, webapp)),
        notifier,
    }
}

pub async fn seed_gift(store: &MemoryStore, total: u32, sold: u32) -> GiftDefinition {
    let id = GiftId::new();
    let gift = GiftDefinition {
        id,
        name: "Blue Star".into(),
        slug: format!("blue-star-{}", id.to_hex()),
        price: Decimal::new(5, 0),
        currency: Currency::Ton,
        total_available: total,
        sold,
        color: "#0af".into(),
        pattern_id: "star".into(),
        lottie_id: "star".into(),
    };
    store.insert_gift(&gift).await.unwrap();
    gift
}

pub fn paid(payment_id: PaymentId, gift: GiftId, buyer: UserId) -> PaymentCompletedEvent {
    PaymentCompletedEvent {
        payment_id,
        paid_at: Utc::now(),
        gift_id: gift,
        buyer_id: buyer,
        buyer_first_name: Some(format!("buyer-{}", buyer)),
    }
}

/// Settle a fresh payment and return the new transaction id
pub async fn settled_transaction(w: &World, payment_id: PaymentId, buyer: UserId) -> TransactionId {
    let gift = seed_gift(&w.store, 10, 0).await;
    w.engine
        .settle(&paid(payment_id, gift.id, buyer))
        .await
        .unwrap()
        .transaction()
        .id
}
