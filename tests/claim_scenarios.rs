//! Claim scenarios against the in-memory store

mod common;

use common::{settled_transaction, world};
use giftpay::claim::{ClaimError, ClaimOutcome};
use giftpay::models::Receiver;
use giftpay::store::{TransactionStore, UserDirectory};

const BUYER: i64 = 500;
const U2: i64 = 501;
const U3: i64 = 502;

#[tokio::test]
async fn first_claim_binds_and_later_claims_only_read() {
    let w = world();
    let t1 = settled_transaction(&w, 1, BUYER).await;

    let first = w.protocol.claim(t1, BUYER, U2).await.unwrap();
    assert!(first.is_first_claim());
    assert_eq!(first.view().receiver.as_ref().map(|u| u.telegram_id), Some(U2));

    let tx = w.store.get_transaction(t1).await.unwrap().unwrap();
    assert_eq!(tx.receiver, Receiver::Bound(U2));

    let u2 = w.store.get_user(U2).await.unwrap().unwrap();
    assert!(u2.gifts.contains(&t1));
    assert!(u2.transactions.contains(&t1));
    assert_eq!(u2.total_gifts_count, 1);

    let buyer = w.store.get_user(BUYER).await.unwrap().unwrap();
    assert!(buyer.pending_gifts.is_empty());
    assert!(buyer.transactions.contains(&t1));

    let second = w.protocol.claim(t1, BUYER, U3).await.unwrap();
    assert!(matches!(second, ClaimOutcome::AlreadyClaimed(_)));
    assert_eq!(second.view().receiver.as_ref().map(|u| u.telegram_id), Some(U2));
    assert!(w.store.get_user(U3).await.unwrap().is_none_or(|u| u.gifts.is_empty()));
    assert_eq!(w.store.get_transaction(t1).await.unwrap().unwrap().receiver, Receiver::Bound(U2));
}

#[tokio::test]
async fn claim_requires_matching_sender_and_completed_status() {
    let w = world();
    let t1 = settled_transaction(&w, 2, BUYER).await;

    let err = w.protocol.claim(t1, BUYER + 1, U2).await.unwrap_err();
    assert!(matches!(err, ClaimError::TransactionNotFound(id) if id == t1));
    assert_eq!(w.store.get_transaction(t1).await.unwrap().unwrap().receiver, Receiver::Unclaimed);

    let err = w
        .protocol
        .claim(giftpay::TransactionId::new(), BUYER, U2)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_bind_exactly_one_receiver() {
    for round in 0..20 {
        let w = world();
        let t1 = settled_transaction(&w, 100 + round, BUYER).await;

        let claimers = [U2, U3];
        let handles: Vec<_> = claimers
            .iter()
            .map(|&claimer| {
                let protocol = w.protocol.clone();
                tokio::spawn(async move { protocol.claim(t1, BUYER, claimer).await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap().unwrap());
        }

        let winners: Vec<_> = outcomes.iter().filter(|o| o.is_first_claim()).collect();
        assert_eq!(winners.len(), 1);

        let bound = w.store.get_transaction(t1).await.unwrap().unwrap().receiver;
        let Receiver::Bound(winner) = bound else {
            panic!("transaction left unclaimed");
        };
        for o in &outcomes {
            assert_eq!(o.view().receiver.as_ref().map(|u| u.telegram_id), Some(winner));
        }

        let loser = if winner == U2 { U3 } else { U2 };
        assert!(w.store.get_user(loser).await.unwrap().is_none_or(|u| u.gifts.is_empty()));
        assert_eq!(w.store.get_user(winner).await.unwrap().unwrap().total_gifts_count, 1);
    }
}

#[tokio::test]
async fn gift_count_matches_claims_despite_retries() {
    let w = world();
    let mut claimed = Vec::new();

    for payment in 0..4 {
        let tx = settled_transaction(&w, 200 + payment, BUYER).await;
        w.protocol.claim(tx, BUYER, U2).await.unwrap();
        // Duplicate and foreign retries interleaved
        w.protocol.claim(tx, BUYER, U2).await.unwrap();
        w.protocol.claim(tx, BUYER, U3).await.unwrap();
        claimed.push(tx);

        let u2 = w.store.get_user(U2).await.unwrap().unwrap();
        assert_eq!(u2.total_gifts_count as usize, claimed.len());
        assert_eq!(u2.gifts.len(), claimed.len());
    }

    assert!(w.store.get_user(U3).await.unwrap().is_none_or(|u| u.total_gifts_count == 0));
}

#[tokio::test]
async fn claim_notifies_both_parties() {
    let w = world();
    let t1 = settled_transaction(&w, 300, BUYER).await;

    w.protocol.claim(t1, BUYER, U2).await.unwrap();
    // Reads never notify
    w.protocol.claim(t1, BUYER, U3).await.unwrap();

    // Dispatch is fire-and-forget; give the spawned tasks a moment
    for _ in 0..50 {
        if w.notifier.chats.lock().unwrap().len() >= 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let mut chats = w.notifier.chats.lock().unwrap().clone();
    chats.sort();
    // purchase_success to the buyer, then received + delivered
    assert_eq!(chats, vec![BUYER, BUYER, U2]);
}
