use actix_web::http::StatusCode;
use campfund_engine::{
    db_types::{CampaignStatus, Gateway, Money, OrderCode},
    test_utils::{
        fixtures::{running_campaign, seed_campaign, seed_donation},
        prepare_env::new_test_ledger,
    },
    traits::LedgerError,
    LedgerStore,
    MemoryCache,
};
use serde_json::json;

use super::{
    helpers::{ack, configure, post_request},
    mocks::MockLedger,
};

fn push_payload(order_code: &OrderCode, amount: i64, payment_link_id: &str, code: &str) -> String {
    json!({
        "code": "00",
        "desc": "success",
        "success": true,
        "data": {
            "orderCode": order_code.as_str().parse::<u64>().unwrap(),
            "amount": amount,
            "description": format!("CAMPFUND {order_code}"),
            "reference": format!("FT{payment_link_id}"),
            "transactionDateTime": "2025-11-09 15:10:30",
            "paymentLinkId": payment_link_id,
            "code": code,
            "desc": "ok"
        }
    })
    .to_string()
}

fn bank_feed_payload(id: i64, content: &str, amount: i64, transfer_type: &str) -> String {
    json!({
        "id": id,
        "gateway": "Vietcombank",
        "transactionDate": "2025-11-09 15:12:01",
        "accountNumber": "0071000888888",
        "content": content,
        "transferType": transfer_type,
        "transferAmount": amount,
        "referenceCode": format!("MBVCB.{id}"),
        "description": ""
    })
    .to_string()
}

#[actix_web::test]
async fn push_webhook_credits_the_campaign() {
    let db = new_test_ledger().await;
    let cache = MemoryCache::new();
    let campaign = seed_campaign(&db, running_campaign(1_000_000, CampaignStatus::Active)).await;
    let tx = seed_donation(&db, campaign.id, "alice", 200_000, Gateway::Push).await;
    let code = tx.order_code.unwrap();

    let body = push_payload(&code, 200_000, "pl-1", "00");
    let (status, res) = post_request("/webhooks/push", body.clone(), configure(db.clone(), cache.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let res = ack(&res);
    assert!(res.success, "{}", res.message);
    assert!(res.message.starts_with("Credited 200,000 VND to campaign"), "{}", res.message);

    // The gateway redelivers the same notification
    let (status, res) = post_request("/webhooks/push", body, configure(db.clone(), cache.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let res = ack(&res);
    assert!(!res.success);
    assert_eq!(res.message, "Duplicate delivery");

    let campaign = db.fetch_campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(campaign.received_amount, Money::from(200_000));
    assert_eq!(campaign.donation_count, 1);
}

#[actix_web::test]
async fn bank_feed_after_push_is_a_lagging_duplicate() {
    let db = new_test_ledger().await;
    let cache = MemoryCache::new();
    let campaign = seed_campaign(&db, running_campaign(1_000_000, CampaignStatus::Active)).await;
    let tx = seed_donation(&db, campaign.id, "bao", 150_000, Gateway::Push).await;
    let code = tx.order_code.unwrap();

    let (_, res) =
        post_request("/webhooks/push", push_payload(&code, 150_000, "pl-2", "00"), configure(db.clone(), cache.clone()))
            .await;
    assert!(ack(&res).success);
    let content = format!("IBFT {code} ung ho");
    let (status, res) =
        post_request("/webhooks/bank-feed", bank_feed_payload(5001, &content, 150_000, "in"), configure(db.clone(), cache))
            .await;
    assert_eq!(status, StatusCode::OK);
    let res = ack(&res);
    assert!(!res.success);
    assert!(res.message.contains("already credited by the push gateway"), "{}", res.message);

    let campaign = db.fetch_campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(campaign.received_amount, Money::from(150_000));
}

#[actix_web::test]
async fn uncorrelated_bank_transfers_are_held() {
    let db = new_test_ledger().await;
    let (status, res) = post_request(
        "/webhooks/bank-feed",
        bank_feed_payload(5002, "chuyen tien ung ho", 80_000, "in"),
        configure(db.clone(), MemoryCache::new()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let res = ack(&res);
    assert!(res.success);
    assert!(res.message.contains("holding account"), "{}", res.message);
    assert_eq!(db.fetch_holding_entries().await.unwrap().len(), 1);
}

#[actix_web::test]
async fn withdrawals_are_recorded() {
    let db = new_test_ledger().await;
    let (status, res) = post_request(
        "/webhooks/bank-feed",
        bank_feed_payload(5003, "Rut tien", 500_000, "out"),
        configure(db.clone(), MemoryCache::new()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(ack(&res).success);
    assert_eq!(db.fetch_withdrawals().await.unwrap().len(), 1);
}

#[actix_web::test]
async fn push_failures_mark_the_transaction() {
    let db = new_test_ledger().await;
    let campaign = seed_campaign(&db, running_campaign(1_000_000, CampaignStatus::Active)).await;
    let tx = seed_donation(&db, campaign.id, "chi", 90_000, Gateway::Push).await;
    let code = tx.order_code.unwrap();
    let (status, res) = post_request(
        "/webhooks/push",
        push_payload(&code, 90_000, "pl-3", "07"),
        configure(db.clone(), MemoryCache::new()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let res = ack(&res);
    assert!(res.success);
    assert!(res.message.ends_with("marked as failed"), "{}", res.message);
    let campaign = db.fetch_campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(campaign.received_amount, Money::from(0));
}

#[actix_web::test]
async fn malformed_payloads_are_acknowledged() {
    let db = new_test_ledger().await;
    let cache = MemoryCache::new();
    for (path, body) in [
        ("/webhooks/push", "{not json".to_string()),
        ("/webhooks/push", json!({"code": "00", "data": {"amount": 5}}).to_string()),
        ("/webhooks/bank-feed", json!({"id": 1, "transferType": "in"}).to_string()),
    ] {
        let (status, res) = post_request(path, body, configure(db.clone(), cache.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!ack(&res).success);
    }
    assert!(cache.is_empty());
    assert!(db.fetch_outbox_events().await.unwrap().is_empty());
}

/// A ledger whose storage fails on the first read. Clones (taken by the donation route) expect nothing.
fn failing_ledger() -> MockLedger {
    let mut ledger = MockLedger::new();
    ledger
        .expect_fetch_transaction_by_order_code()
        .times(1)
        .returning(|_| Err(LedgerError::DatabaseError("disk I/O error".to_string())));
    ledger.expect_clone().returning(MockLedger::new);
    ledger
}

#[actix_web::test]
async fn storage_failures_ask_the_gateway_to_retry() {
    let _ = env_logger::try_init();
    let cache = MemoryCache::new();
    let code: OrderCode = "1762653025868727".parse().unwrap();
    let body = push_payload(&code, 100_000, "pl-4", "00");

    for _ in 0..2 {
        let (status, res) = post_request("/webhooks/push", body.clone(), configure(failing_ledger(), cache.clone())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.contains("disk I/O error"), "{res}");
        // The fingerprint was released, so the retry reaches the ledger again
        assert!(cache.is_empty());
    }
}
