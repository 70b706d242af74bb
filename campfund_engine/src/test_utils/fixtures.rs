use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::{
    cfe_api::gateway_objects::{BankFeedEvent, GatewayEvent, PushGatewayEvent, TransferOutcome},
    db_types::{
        Campaign,
        CampaignStatus,
        Gateway,
        Money,
        NewCampaign,
        NewDonation,
        OrderCode,
        PaymentTransaction,
        TransferDirection,
    },
    traits::{LedgerError, LedgerStore},
    SqliteDatabase,
};

pub const HOLDING_ACCOUNT: &str = "holding-account";

/// A campaign that runs from a day ago until a week from now.
pub fn running_campaign(target: i64, status: CampaignStatus) -> NewCampaign {
    let now = Utc::now();
    NewCampaign {
        owner_id: "owner-1".to_string(),
        title: "Clean water for Ha Giang".to_string(),
        target_amount: Money::from(target),
        status,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(7),
    }
}

pub fn campaign_with_dates(
    target: i64,
    status: CampaignStatus,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> NewCampaign {
    NewCampaign { start_date, end_date, ..running_campaign(target, status) }
}

pub async fn seed_campaign(db: &SqliteDatabase, campaign: NewCampaign) -> Campaign {
    db.insert_campaign(campaign).await.expect("Error seeding campaign")
}

/// Records a donation intent with a fresh order code and returns the primary transaction.
pub async fn seed_donation(
    db: &SqliteDatabase,
    campaign_id: i64,
    donor: &str,
    amount: i64,
    gateway: Gateway,
) -> PaymentTransaction {
    let donation = NewDonation::new(campaign_id, donor, Money::from(amount), gateway).with_email(format!("{donor}@example.com"));
    for _ in 0..10 {
        match db.insert_donation_intent(donation.clone(), OrderCode::generate(Utc::now())).await {
            Ok((_, tx)) => return tx,
            Err(LedgerError::DuplicateOrderCode(_)) => continue,
            Err(e) => panic!("Error seeding donation. {e}"),
        }
    }
    panic!("Could not allocate an order code for the seeded donation")
}

/// A successful push notification for `order_code`. The push gateway uses the payment link id as its event id.
pub fn push_success(order_code: &OrderCode, amount: i64, event_id: &str) -> GatewayEvent {
    push_event(order_code, amount, event_id, TransferOutcome::Succeeded)
}

pub fn push_failure(order_code: &OrderCode, event_id: &str, code: &str) -> GatewayEvent {
    let outcome = TransferOutcome::Failed { code: code.to_string(), description: "Payment cancelled".to_string() };
    push_event(order_code, 0, event_id, outcome)
}

fn push_event(order_code: &OrderCode, amount: i64, event_id: &str, outcome: TransferOutcome) -> GatewayEvent {
    GatewayEvent::Push(PushGatewayEvent {
        event_id: event_id.to_string(),
        order_code: order_code.clone(),
        amount: Money::from(amount),
        reference: format!("FT{event_id}"),
        description: format!("CAMPFUND {order_code}"),
        outcome,
        transaction_time: Some("2025-11-09 15:10:30".to_string()),
        raw: json!({ "orderCode": order_code.as_str(), "amount": amount, "paymentLinkId": event_id }),
    })
}

/// An inbound bank feed transfer with the given free-text content.
pub fn bank_transfer(content: &str, amount: i64, event_id: &str) -> GatewayEvent {
    bank_feed(content, amount, event_id, TransferDirection::Inbound)
}

pub fn bank_feed(content: &str, amount: i64, event_id: &str, direction: TransferDirection) -> GatewayEvent {
    GatewayEvent::BankFeed(BankFeedEvent {
        event_id: event_id.to_string(),
        bank: "Vietcombank".to_string(),
        account_number: Some("0071000888888".to_string()),
        transaction_date: Some("2025-11-09 15:10:30".to_string()),
        direction,
        amount: Money::from(amount),
        content: content.to_string(),
        description: None,
        reference_code: format!("MBVCB.{event_id}"),
        raw: json!({ "id": event_id, "content": content, "transferAmount": amount }),
    })
}
