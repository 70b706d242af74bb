use campfund_engine::{
    db_types::{CampaignStatus, Gateway, Money, NewCampaign, NewDonation, OrderCode, TransferDirection},
    gateway_objects::GatewayEvent,
    test_utils::fixtures::{bank_feed, bank_transfer, campaign_with_dates, push_failure, push_success, running_campaign},
    DiscardReason,
    IngestionResult,
    LedgerStore,
    ReconciliationOutcome,
};
use chrono::{Duration as Span, Utc};
use cucumber::{given, then, when};

use crate::cucumber::CampfundWorld;

fn parse_status(status: &str) -> CampaignStatus {
    status.parse().unwrap_or_else(|e| panic!("{e}"))
}

async fn add_campaign(world: &mut CampfundWorld, name: String, campaign: NewCampaign) {
    let campaign = world.system().db.insert_campaign(campaign).await.expect("Error creating campaign");
    world.system_mut().campaigns.insert(name, campaign.id);
}

#[given(expr = "a(n) {word} campaign '{word}' with a target of {int} VND")]
async fn campaign(world: &mut CampfundWorld, status: String, name: String, target: i64) {
    add_campaign(world, name, running_campaign(target, parse_status(&status))).await;
}

#[given(expr = "a(n) {word} campaign '{word}' with a target of {int} VND that ended an hour ago")]
async fn ended_campaign(world: &mut CampfundWorld, status: String, name: String, target: i64) {
    let now = Utc::now();
    let campaign = campaign_with_dates(target, parse_status(&status), now - Span::days(30), now - Span::hours(1));
    add_campaign(world, name, campaign).await;
}

#[given(expr = "'{word}' pledges {int} VND to '{word}' as donation '{word}'")]
async fn pledge(world: &mut CampfundWorld, donor: String, amount: i64, campaign: String, donation: String) {
    let campaign_id = world.campaign_id(&campaign);
    let intent = NewDonation::new(campaign_id, donor, Money::from(amount), Gateway::Push);
    let (_, tx) = world
        .system()
        .db
        .insert_donation_intent(intent, OrderCode::generate(Utc::now()))
        .await
        .expect("Error recording donation intent");
    let code = tx.order_code.expect("Primary transactions carry an order code");
    world.system_mut().order_codes.insert(donation, code);
}

async fn deliver(world: &mut CampfundWorld, event: GatewayEvent) {
    let result = world.system().ingestor.ingest(event).await.expect("Error ingesting gateway event");
    world.system_mut().last_result = Some(result);
}

#[when(expr = "the push gateway reports {int} VND for donation '{word}' with event id '{word}'")]
async fn push_report(world: &mut CampfundWorld, amount: i64, donation: String, event_id: String) {
    let code = world.order_code(&donation);
    deliver(world, push_success(&code, amount, &event_id)).await;
}

#[when(expr = "the push gateway reports a failure for donation '{word}' with event id '{word}'")]
async fn push_failure_report(world: &mut CampfundWorld, donation: String, event_id: String) {
    let code = world.order_code(&donation);
    deliver(world, push_failure(&code, &event_id, "CANCELLED")).await;
}

#[when(expr = "the bank feed reports {int} VND for donation '{word}' with event id '{word}'")]
async fn bank_report(world: &mut CampfundWorld, amount: i64, donation: String, event_id: String) {
    let code = world.order_code(&donation);
    let content = format!("IBFT CAMPFUND {code} ung ho");
    deliver(world, bank_transfer(&content, amount, &event_id)).await;
}

#[when(expr = "the bank feed reports {int} VND with content {string} and event id '{word}'")]
async fn bank_report_with_content(world: &mut CampfundWorld, amount: i64, content: String, event_id: String) {
    deliver(world, bank_transfer(&content, amount, &event_id)).await;
}

#[when(expr = "the bank feed reports a withdrawal of {int} VND with event id '{word}'")]
async fn bank_withdrawal(world: &mut CampfundWorld, amount: i64, event_id: String) {
    deliver(world, bank_feed("Rut tien", amount, &event_id, TransferDirection::Outbound)).await;
}

#[when(expr = "the {word} job runs")]
async fn run_job(world: &mut CampfundWorld, job: String) {
    let scheduler = &world.system().scheduler;
    let report = match job.as_str() {
        "activation" => scheduler.run_activation(Utc::now()).await,
        "completion" => scheduler.run_completion(Utc::now()).await,
        "expiration" => scheduler.run_expiration(Utc::now()).await,
        _ => panic!("Unknown job {job}"),
    }
    .expect("Error running scheduler job");
    assert_eq!(report.failed(), 0, "{report}");
}

#[then(expr = "campaign '{word}' has received {int} VND")]
async fn campaign_received(world: &mut CampfundWorld, name: String, amount: i64) {
    let id = world.campaign_id(&name);
    let campaign = world.system().db.fetch_campaign(id).await.expect("Error fetching campaign").expect("No campaign");
    assert_eq!(campaign.received_amount, Money::from(amount), "Received amount is incorrect");
}

#[then(expr = "campaign '{word}' is {word}")]
async fn campaign_status(world: &mut CampfundWorld, name: String, status: String) {
    let id = world.campaign_id(&name);
    let campaign = world.system().db.fetch_campaign(id).await.expect("Error fetching campaign").expect("No campaign");
    assert_eq!(campaign.status, parse_status(&status), "Campaign status is incorrect");
}

#[then(expr = "the delivery was {word}")]
async fn last_outcome(world: &mut CampfundWorld, expected: String) {
    let result = world.system().last_result.clone().expect("Nothing was delivered");
    let matched = match (expected.as_str(), &result) {
        ("a-duplicate", IngestionResult::Duplicate) => true,
        (_, IngestionResult::Duplicate) => false,
        (expected, IngestionResult::Processed(outcome)) => match (expected, outcome) {
            ("credited", ReconciliationOutcome::Credited { .. }) => true,
            ("supplemented", ReconciliationOutcome::Supplemented { .. }) => true,
            ("held", ReconciliationOutcome::Held { .. }) => true,
            ("failed", ReconciliationOutcome::TransactionFailed { .. }) => true,
            ("a-withdrawal", ReconciliationOutcome::WithdrawalRecorded { .. }) => true,
            ("a-lagging-duplicate", ReconciliationOutcome::Discarded(DiscardReason::LaggingDuplicate { .. })) => true,
            ("ignored", ReconciliationOutcome::Discarded(_)) => true,
            _ => false,
        },
    };
    assert!(matched, "Expected the delivery to be {expected}, but it was {result:?}");
}

#[then(expr = "the transaction for donation '{word}' is {word}")]
async fn transaction_completeness(world: &mut CampfundWorld, donation: String, completeness: String) {
    let code = world.order_code(&donation);
    let db = &world.system().db;
    let tx = db
        .fetch_transaction_by_order_code(&code)
        .await
        .expect("Error fetching transaction")
        .expect("No transaction for that order code");
    let txs = db.fetch_transactions_for_donation(tx.donation_id).await.expect("Error fetching transactions");
    let latest = txs.last().expect("Donation has no transactions");
    assert_eq!(latest.completeness.to_string(), completeness.to_ascii_uppercase(), "Completeness is incorrect");
}

#[then(expr = "the holding account has {int} entries")]
async fn holding_entries(world: &mut CampfundWorld, count: usize) {
    let entries = world.system().db.fetch_holding_entries().await.expect("Error fetching holding entries");
    assert_eq!(entries.len(), count, "Holding entry count is incorrect");
}

#[then(expr = "there are {int} {word} outbox events")]
async fn outbox_events(world: &mut CampfundWorld, count: usize, event_type: String) {
    let events = world.system().db.fetch_outbox_events().await.expect("Error fetching outbox events");
    let found = events.iter().filter(|e| e.event_type == event_type).count();
    assert_eq!(found, count, "Outbox event count for {event_type} is incorrect");
}
