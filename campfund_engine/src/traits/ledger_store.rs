use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Campaign,
        CampaignStatus,
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
    traits::data_objects::{CampaignTransition, CreditOutcome, FundingSettlement},
};

/// The durable store behind the reconciliation engine, the outbox relay and the campaign scheduler.
///
/// Every method that mutates more than one row does so in a single atomic unit. In particular, every ledger mutation
/// that produces a side effect writes the corresponding outbox event in the same transaction, so a side effect can never
/// be lost or produced for a mutation that was rolled back.
#[allow(async_fn_in_trait)]
pub trait LedgerStore: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    //-----------------------------------------   Transactions   -----------------------------------------------------
    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, LedgerError>;

    async fn fetch_transaction_by_order_code(
        &self,
        order_code: &OrderCode,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    /// All transactions (primary first, then supplementary rows in insertion order) for a donation.
    async fn fetch_transactions_for_donation(&self, donation_id: i64) -> Result<Vec<PaymentTransaction>, LedgerError>;

    async fn fetch_donation(&self, id: i64) -> Result<Option<Donation>, LedgerError>;

    /// Creates a donation together with its primary payment transaction, which carries `order_code`.
    async fn insert_donation_intent(
        &self,
        donation: NewDonation,
        order_code: OrderCode,
    ) -> Result<(Donation, PaymentTransaction), LedgerError>;

    /// The first webhook credit against a primary transaction. In one atomic unit:
    /// * The transaction is updated, conditional on `processed_by_webhook` still being false.
    /// * The campaign's `received_amount` is incremented by the credited amount and `donation_count` by one.
    /// * A `DONATION_PAYMENT_SUCCEEDED` outbox event is written.
    /// * A `CAMPAIGN_SURPLUS_SETTLED` outbox event is written if this credit took an ACTIVE campaign over its target.
    ///
    /// If the conditional update matches nothing (another delivery won the race) nothing is written and
    /// [`CreditOutcome::LostRace`] is returned.
    async fn record_primary_credit(&self, credit: PrimaryCredit) -> Result<CreditOutcome, LedgerError>;

    /// Records additional funds against an already processed transaction as a new supplementary row. The campaign
    /// total is incremented, `donation_count` is not. Outbox events are written as for [`Self::record_primary_credit`].
    async fn create_supplementary_transaction(&self, credit: SupplementaryCredit)
        -> Result<CreditOutcome, LedgerError>;

    /// Marks a pending, unprocessed transaction as failed. Returns `None` if the transaction had already been processed.
    async fn mark_transaction_failed(
        &self,
        id: i64,
        error_code: &str,
        error_description: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError>;

    /// Credits an uncorrelated transfer to the holding ledger and writes a `HOLDING_ACCOUNT_CREDITED` outbox event.
    async fn credit_holding_account(&self, credit: HoldingCredit) -> Result<HoldingEntry, LedgerError>;

    async fn record_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError>;

    //-----------------------------------------     Outbox       -----------------------------------------------------
    /// PENDING events whose next attempt time is not after `now`, oldest first.
    async fn fetch_pending_outbox_events(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, LedgerError>;

    async fn fetch_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, LedgerError>;

    /// Compare-and-swap PENDING → PROCESSING. Returns false if another worker claimed the event first.
    async fn claim_outbox_event(&self, id: i64, now: DateTime<Utc>) -> Result<bool, LedgerError>;

    async fn complete_outbox_event(&self, id: i64) -> Result<(), LedgerError>;

    /// Records a failed attempt: the retry count is incremented, the error is stored and the event is either
    /// rescheduled or dead-lettered, according to `disposition`.
    async fn fail_outbox_event(
        &self,
        id: i64,
        error: &str,
        disposition: RetryDisposition,
    ) -> Result<OutboxEvent, LedgerError>;

    /// Returns PROCESSING events claimed before `claimed_before` to PENDING. Returns the number of events released.
    async fn release_stale_outbox_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64, LedgerError>;

    /// Moves dead-lettered events back to PENDING with a fresh retry budget. Returns the number of events requeued.
    async fn requeue_failed_outbox_events(&self) -> Result<u64, LedgerError>;

    //-----------------------------------------    Campaigns     -----------------------------------------------------
    async fn fetch_campaign(&self, id: i64) -> Result<Option<Campaign>, LedgerError>;

    /// APPROVED campaigns whose start date has arrived.
    async fn fetch_campaigns_due_for_activation(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError>;

    /// ACTIVE campaigns whose end date has passed, or that have reached their target.
    async fn fetch_campaigns_due_for_completion(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError>;

    /// PENDING or APPROVED campaigns whose end date has passed.
    async fn fetch_campaigns_due_for_expiration(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError>;

    /// Compare-and-swap status transition `from` → `to` that co-commits a `CAMPAIGN_STATUS_CHANGED` event.
    ///
    /// Returns `None` if the campaign was no longer in `from`. Transitions that are not in the lifecycle table are
    /// rejected with [`LedgerError::IllegalCampaignTransition`].
    async fn transition_campaign(
        &self,
        transition: CampaignTransition,
    ) -> Result<Option<Campaign>, LedgerError>;

    /// Closes an ACTIVE campaign. The decision between PROCESSING and ENDED is made on the row as re-read inside the
    /// atomic unit. An ENDED campaign with funds also gets a single `CAMPAIGN_FUNDS_POOLED` event for the full amount.
    ///
    /// Returns `None` if the campaign is no longer ACTIVE.
    async fn complete_campaign_funding(
        &self,
        campaign_id: i64,
        threshold_percent: u32,
    ) -> Result<Option<FundingSettlement>, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The external reference {0} has already been recorded")]
    DuplicateExternalRef(String),
    #[error("The order code {0} is already in use")]
    DuplicateOrderCode(OrderCode),
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(i64),
    #[error("The requested donation {0} does not exist")]
    DonationNotFound(i64),
    #[error("The requested campaign {0} does not exist")]
    CampaignNotFound(i64),
    #[error("A campaign cannot move from {from} to {to}")]
    IllegalCampaignTransition { from: CampaignStatus, to: CampaignStatus },
    #[error("The requested outbox event {0} does not exist")]
    OutboxEventNotFound(i64),
    #[error("Could not serialize the outbox payload. {0}")]
    PayloadError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::PayloadError(e.to_string())
    }
}
