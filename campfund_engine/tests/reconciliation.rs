use campfund_engine::{
    db_types::{CampaignStatus, Gateway, HoldReason, Money, OrderCode, PaymentCompleteness, TransferDirection},
    gateway_objects::{GatewayEvent, TransferEvent},
    side_effects::{CAMPAIGN_SURPLUS_SETTLED, DONATION_PAYMENT_SUCCEEDED, HOLDING_ACCOUNT_CREDITED},
    test_utils::{
        fixtures::{
            bank_feed,
            bank_transfer,
            push_failure,
            push_success,
            running_campaign,
            seed_campaign,
            seed_donation,
            HOLDING_ACCOUNT,
        },
        prepare_env::new_test_ledger,
    },
    DiscardReason,
    IdempotencyGuard,
    IngestionResult,
    LedgerStore,
    MemoryCache,
    ReconciliationApi,
    ReconciliationOutcome,
    SqliteDatabase,
    WebhookIngestor,
};

struct Setup {
    db: SqliteDatabase,
    ingestor: WebhookIngestor<SqliteDatabase, MemoryCache>,
    campaign_id: i64,
}

async fn setup(target: i64) -> Setup {
    let db = new_test_ledger().await;
    let campaign = seed_campaign(&db, running_campaign(target, CampaignStatus::Active)).await;
    let api = ReconciliationApi::new(db.clone(), HOLDING_ACCOUNT);
    let ingestor = WebhookIngestor::new(IdempotencyGuard::new(MemoryCache::new()), api);
    Setup { db, ingestor, campaign_id: campaign.id }
}

impl Setup {
    async fn donate(&self, amount: i64) -> (i64, OrderCode) {
        let tx = seed_donation(&self.db, self.campaign_id, "alice", amount, Gateway::Push).await;
        (tx.id, tx.order_code.expect("Primary transactions carry an order code"))
    }

    async fn received(&self) -> Money {
        self.db.fetch_campaign(self.campaign_id).await.unwrap().unwrap().received_amount
    }

    async fn count_events(&self, event_type: &str) -> usize {
        self.db.fetch_outbox_events().await.unwrap().iter().filter(|e| e.event_type == event_type).count()
    }

    async fn ingest(&self, event: GatewayEvent) -> ReconciliationOutcome {
        match self.ingestor.ingest(event).await.expect("Ingestion failed") {
            IngestionResult::Processed(outcome) => outcome,
            IngestionResult::Duplicate => panic!("Unexpected duplicate"),
        }
    }
}

#[tokio::test]
async fn push_then_bank_feed_credits_once() {
    let s = setup(10_000_000).await;
    let (tx_id, code) = s.donate(500_000).await;

    let outcome = s.ingest(push_success(&code, 500_000, "pl-1")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Credited { completeness: PaymentCompleteness::Completed, .. }));

    let content = format!("CAMPFUND {code} ung ho");
    let outcome = s.ingest(bank_transfer(&content, 500_000, "9001")).await;
    let expected = DiscardReason::LaggingDuplicate { transaction_id: tx_id, credited_by: Gateway::Push };
    assert_eq!(outcome, ReconciliationOutcome::Discarded(expected));

    assert_eq!(s.received().await, Money::from(500_000));
    assert_eq!(s.count_events(DONATION_PAYMENT_SUCCEEDED).await, 1);
    let tx = s.db.fetch_transaction(tx_id).await.unwrap().unwrap();
    assert!(tx.processed_by_webhook);
    assert_eq!(tx.gateway, Gateway::Push);
    assert!(tx.external_ref.unwrap().starts_with("push:pl-1:"));
}

#[tokio::test]
async fn bank_feed_first_wins_and_push_is_discarded() {
    let s = setup(10_000_000).await;
    let (tx_id, code) = s.donate(200_000).await;

    let content = format!("Chuyen tien {code}");
    let outcome = s.ingest(bank_transfer(&content, 200_000, "9002")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Credited { transaction_id, .. } if transaction_id == tx_id));

    let outcome = s.ingest(push_success(&code, 200_000, "pl-2")).await;
    assert_eq!(
        outcome,
        ReconciliationOutcome::Discarded(DiscardReason::LaggingDuplicate {
            transaction_id: tx_id,
            credited_by: Gateway::BankFeed
        })
    );
    assert_eq!(s.received().await, Money::from(200_000));
    let campaign = s.db.fetch_campaign(s.campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.donation_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_reports_of_one_transfer_credit_exactly_once() {
    let s = setup(10_000_000).await;
    for i in 0..10 {
        let (_, code) = s.donate(100_000).await;
        let content = format!("CAMPFUND {code}");
        let push = s.ingestor.ingest(push_success(&code, 100_000, &format!("pl-race-{i}")));
        let bank = s.ingestor.ingest(bank_transfer(&content, 100_000, &format!("race-{i}")));
        let (push, bank) = tokio::join!(push, bank);
        let credits = [push.unwrap(), bank.unwrap()]
            .into_iter()
            .filter(|r| matches!(r, IngestionResult::Processed(o) if o.is_credit()))
            .count();
        assert_eq!(credits, 1, "Transfer {i} was credited {credits} times");
    }
    assert_eq!(s.received().await, Money::from(1_000_000));
    assert_eq!(s.count_events(DONATION_PAYMENT_SUCCEEDED).await, 10);
}

#[tokio::test]
async fn a_partial_transfer_can_be_topped_up() {
    let s = setup(10_000_000).await;
    let (tx_id, code) = s.donate(300_000).await;
    let content = format!("CAMPFUND {code}");

    let outcome = s.ingest(bank_transfer(&content, 100_000, "9101")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Credited { completeness: PaymentCompleteness::Partial, .. }));

    let outcome = s.ingest(bank_transfer(&content, 200_000, "9102")).await;
    match outcome {
        ReconciliationOutcome::Supplemented { parent_id, amount, completeness, .. } => {
            assert_eq!(parent_id, tx_id);
            assert_eq!(amount, Money::from(200_000));
            assert_eq!(completeness, PaymentCompleteness::Completed);
        },
        other => panic!("Expected a supplementary credit, got {other:?}"),
    }
    assert_eq!(s.received().await, Money::from(300_000));

    let donation_id = s.db.fetch_transaction(tx_id).await.unwrap().unwrap().donation_id;
    let txs = s.db.fetch_transactions_for_donation(donation_id).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert!(!txs[0].is_supplementary());
    assert_eq!(txs[1].parent_id, Some(tx_id));
    // Supplementary credits do not count as new donations
    let campaign = s.db.fetch_campaign(s.campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.donation_count, 1);
}

#[tokio::test]
async fn a_top_up_through_the_other_gateway_is_held() {
    let s = setup(10_000_000).await;
    let (tx_id, code) = s.donate(300_000).await;
    let content = format!("CAMPFUND {code}");
    let outcome = s.ingest(bank_transfer(&content, 100_000, "9401")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Credited { completeness: PaymentCompleteness::Partial, .. }));

    // The donor pays the rest through the push gateway. That cannot be the bank transfer already credited.
    let outcome = s.ingest(push_success(&code, 200_000, "pl-topup")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Held { reason: HoldReason::CrossGatewayTopUp, .. }));
    assert_eq!(s.received().await, Money::from(100_000));
    let entries = s.db.fetch_holding_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, Money::from(200_000));
    assert_eq!(entries[0].gateway, Gateway::Push);

    let tx = s.db.fetch_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.gateway, Gateway::BankFeed);
    assert_eq!(tx.received_amount, Money::from(100_000));
    assert_eq!(s.count_events(DONATION_PAYMENT_SUCCEEDED).await, 1);
}

#[tokio::test]
async fn overpayment_past_the_target_settles_a_surplus() {
    let s = setup(1_000_000).await;
    let (_, code) = s.donate(1_000_000).await;
    let outcome = s.ingest(push_success(&code, 1_200_000, "pl-3")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Credited { completeness: PaymentCompleteness::Overpaid, .. }));
    assert_eq!(s.received().await, Money::from(1_200_000));
    assert_eq!(s.count_events(CAMPAIGN_SURPLUS_SETTLED).await, 1);

    // Already over target. Further credits do not settle the surplus again.
    let (_, code) = s.donate(50_000).await;
    s.ingest(push_success(&code, 50_000, "pl-4")).await;
    assert_eq!(s.count_events(CAMPAIGN_SURPLUS_SETTLED).await, 1);
}

#[tokio::test]
async fn unmatched_transfers_go_to_the_holding_account() {
    let s = setup(1_000_000).await;
    let outcome = s.ingest(bank_transfer("ung ho chien dich", 75_000, "9201")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Held { reason: HoldReason::NoOrderCode, .. }));

    let stranger = "CAMPFUND 1731160000000123";
    let outcome = s.ingest(bank_transfer(stranger, 25_000, "9202")).await;
    assert!(matches!(outcome, ReconciliationOutcome::Held { reason: HoldReason::UnknownOrderCode, .. }));

    let entries = s.db.fetch_holding_entries().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(s.count_events(HOLDING_ACCOUNT_CREDITED).await, 2);
    assert_eq!(s.received().await, Money::from(0));
}

#[tokio::test]
async fn external_refs_are_recorded_once() {
    let s = setup(1_000_000).await;
    let event = TransferEvent::from(bank_transfer("no code here", 75_000, "9301"));
    let api = s.ingestor.api();
    let first = api.reconcile(event.clone()).await.unwrap();
    assert!(matches!(first, ReconciliationOutcome::Held { .. }));
    // Past the fingerprint guard (say, after its TTL) the ledger still refuses the same transfer
    let second = api.reconcile(event.clone()).await.unwrap();
    let expected = DiscardReason::AlreadyRecorded { external_ref: event.external_ref() };
    assert_eq!(second, ReconciliationOutcome::Discarded(expected));
    assert_eq!(s.db.fetch_holding_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn redeliveries_are_caught_by_the_fingerprint() {
    let s = setup(1_000_000).await;
    let (_, code) = s.donate(100_000).await;
    let event = push_success(&code, 100_000, "pl-5");
    let first = s.ingestor.ingest(event.clone()).await.unwrap();
    assert!(matches!(first, IngestionResult::Processed(ReconciliationOutcome::Credited { .. })));
    let second = s.ingestor.ingest(event).await.unwrap();
    assert_eq!(second, IngestionResult::Duplicate);
    assert_eq!(s.received().await, Money::from(100_000));
}

#[tokio::test]
async fn push_gateway_failures_only_touch_pending_transactions() {
    let s = setup(1_000_000).await;
    let (tx_id, code) = s.donate(100_000).await;
    let outcome = s.ingest(push_failure(&code, "pl-6", "CANCELLED")).await;
    assert_eq!(outcome, ReconciliationOutcome::TransactionFailed { transaction_id: tx_id });
    let tx = s.db.fetch_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.error_code.as_deref(), Some("CANCELLED"));

    let outcome = s.ingest(push_failure(&code, "pl-7", "EXPIRED")).await;
    assert_eq!(outcome, ReconciliationOutcome::Discarded(DiscardReason::FailureIgnored { transaction_id: tx_id }));

    let unknown: OrderCode = "1731160000000999".parse().unwrap();
    let outcome = s.ingest(push_failure(&unknown, "pl-8", "CANCELLED")).await;
    assert_eq!(outcome, ReconciliationOutcome::Discarded(DiscardReason::UnknownTransaction));
    assert!(s.db.fetch_holding_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_push_reports_are_discarded() {
    let s = setup(1_000_000).await;
    let (tx_id, code) = s.donate(100_000).await;
    s.ingest(push_success(&code, 100_000, "pl-9")).await;
    let outcome = s.ingest(push_success(&code, 100_000, "pl-9-resent")).await;
    assert_eq!(outcome, ReconciliationOutcome::Discarded(DiscardReason::AlreadyProcessed { transaction_id: tx_id }));
    assert_eq!(s.received().await, Money::from(100_000));
}

#[tokio::test]
async fn outbound_transfers_are_recorded_as_withdrawals() {
    let s = setup(1_000_000).await;
    let outcome = s.ingest(bank_feed("Rut tien", 400_000, "9401", TransferDirection::Outbound)).await;
    assert!(matches!(outcome, ReconciliationOutcome::WithdrawalRecorded { .. }));
    let withdrawals = s.db.fetch_withdrawals().await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].amount, Money::from(400_000));
    assert_eq!(s.received().await, Money::from(0));
    assert!(s.db.fetch_holding_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_amount_transfers_are_ignored() {
    let s = setup(1_000_000).await;
    let (_, code) = s.donate(100_000).await;
    let outcome = s.ingest(push_success(&code, 0, "pl-10")).await;
    assert_eq!(outcome, ReconciliationOutcome::Discarded(DiscardReason::NonPositiveAmount));
    assert_eq!(s.received().await, Money::from(0));
}
