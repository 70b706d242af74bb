use campfund_engine::{
    db_types::{
        Campaign,
        Donation,
        HoldingCredit,
        HoldingEntry,
        NewDonation,
        NewWithdrawal,
        OrderCode,
        OutboxEvent,
        PaymentTransaction,
        PrimaryCredit,
        RetryDisposition,
        SupplementaryCredit,
        Withdrawal,
    },
    traits::{CampaignTransition, CreditOutcome, FundingSettlement, LedgerError, LedgerStore},
};
use chrono::{DateTime, Utc};
use mockall::mock;

mock! {
    pub Ledger {}
    impl Clone for Ledger {
        fn clone(&self) -> Self;
    }
    impl LedgerStore for Ledger {
        fn url(&self) -> &str;
        async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, LedgerError>;
        async fn fetch_transaction_by_order_code(&self, order_code: &OrderCode) -> Result<Option<PaymentTransaction>, LedgerError>;
        async fn fetch_transactions_for_donation(&self, donation_id: i64) -> Result<Vec<PaymentTransaction>, LedgerError>;
        async fn fetch_donation(&self, id: i64) -> Result<Option<Donation>, LedgerError>;
        async fn insert_donation_intent(&self, donation: NewDonation, order_code: OrderCode) -> Result<(Donation, PaymentTransaction), LedgerError>;
        async fn record_primary_credit(&self, credit: PrimaryCredit) -> Result<CreditOutcome, LedgerError>;
        async fn create_supplementary_transaction(&self, credit: SupplementaryCredit) -> Result<CreditOutcome, LedgerError>;
        async fn mark_transaction_failed(&self, id: i64, error_code: &str, error_description: &str) -> Result<Option<PaymentTransaction>, LedgerError>;
        async fn credit_holding_account(&self, credit: HoldingCredit) -> Result<HoldingEntry, LedgerError>;
        async fn record_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError>;
        async fn fetch_pending_outbox_events(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<OutboxEvent>, LedgerError>;
        async fn fetch_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, LedgerError>;
        async fn claim_outbox_event(&self, id: i64, now: DateTime<Utc>) -> Result<bool, LedgerError>;
        async fn complete_outbox_event(&self, id: i64) -> Result<(), LedgerError>;
        async fn fail_outbox_event(&self, id: i64, error: &str, disposition: RetryDisposition) -> Result<OutboxEvent, LedgerError>;
        async fn release_stale_outbox_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64, LedgerError>;
        async fn requeue_failed_outbox_events(&self) -> Result<u64, LedgerError>;
        async fn fetch_campaign(&self, id: i64) -> Result<Option<Campaign>, LedgerError>;
        async fn fetch_campaigns_due_for_activation(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Campaign>, LedgerError>;
        async fn fetch_campaigns_due_for_completion(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Campaign>, LedgerError>;
        async fn fetch_campaigns_due_for_expiration(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Campaign>, LedgerError>;
        async fn transition_campaign(&self, transition: CampaignTransition) -> Result<Option<Campaign>, LedgerError>;
        async fn complete_campaign_funding(&self, campaign_id: i64, threshold_percent: u32) -> Result<Option<FundingSettlement>, LedgerError>;
    }
}
