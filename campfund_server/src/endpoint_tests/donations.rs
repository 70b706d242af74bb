use actix_web::http::StatusCode;
use campfund_engine::{
    db_types::{CampaignStatus, Money},
    test_utils::{
        fixtures::{running_campaign, seed_campaign},
        prepare_env::new_test_ledger,
    },
    LedgerStore,
    MemoryCache,
};
use serde_json::json;

use super::helpers::{configure, post_request};
use crate::data_objects::DonationIntentResponse;

#[actix_web::test]
async fn donations_receive_an_order_code() {
    let db = new_test_ledger().await;
    let campaign = seed_campaign(&db, running_campaign(5_000_000, CampaignStatus::Active)).await;
    let body = json!({
        "campaign_id": campaign.id,
        "donor_id": "dung",
        "donor_email": "dung@example.com",
        "amount": 300000,
        "gateway": "bank_feed"
    });
    let (status, res) = post_request("/donations", body.to_string(), configure(db.clone(), MemoryCache::new())).await;
    assert_eq!(status, StatusCode::OK, "{res}");
    let intent: DonationIntentResponse = serde_json::from_str(&res).unwrap();
    assert_eq!(intent.campaign_id, campaign.id);
    assert_eq!(intent.amount, Money::from(300_000));
    assert_eq!(intent.order_code.as_str().len(), 16);
    assert!(intent.transfer_content.contains(intent.order_code.as_str()));

    let tx = db.fetch_transaction_by_order_code(&intent.order_code).await.unwrap().expect("No transaction");
    assert_eq!(tx.id, intent.transaction_id);
    assert_eq!(tx.requested_amount, Money::from(300_000));
    assert!(!tx.processed_by_webhook);
}

#[actix_web::test]
async fn donations_are_validated() {
    let db = new_test_ledger().await;
    let pending = seed_campaign(&db, running_campaign(5_000_000, CampaignStatus::Pending)).await;
    let active = seed_campaign(&db, running_campaign(5_000_000, CampaignStatus::Active)).await;
    let cases = [
        (json!({"campaign_id": active.id, "donor_id": "em", "amount": 0}), StatusCode::BAD_REQUEST),
        (json!({"campaign_id": 9999, "donor_id": "em", "amount": 1000}), StatusCode::NOT_FOUND),
        (json!({"campaign_id": pending.id, "donor_id": "em", "amount": 1000}), StatusCode::UNPROCESSABLE_ENTITY),
        (json!({"donor_id": "em", "amount": 1000}), StatusCode::BAD_REQUEST),
    ];
    for (body, expected) in cases {
        let (status, res) = post_request("/donations", body.to_string(), configure(db.clone(), MemoryCache::new())).await;
        assert_eq!(status, expected, "{body} => {res}");
    }
}
