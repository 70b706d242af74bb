//! `SqliteDatabase` is the SQLite implementation of the [`LedgerStore`] backend.
//!
//! Each trait method that touches more than one row opens a transaction, composes the low-level statements from
//! [`super::db`] on it, and commits. Every such transaction starts with a write statement, so SQLite hands out the
//! write lock at the start of the unit rather than trying to upgrade a read lock half way through.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{campaigns, db_url, donations, holding, new_pool, outbox, transactions};
use crate::{
    db_types::{
        Campaign,
        CampaignStatus,
        Donation,
        HoldingCredit,
        HoldingEntry,
        Money,
        NewCampaign,
        NewDonation,
        NewWithdrawal,
        OrderCode,
        OutboxEvent,
        PaymentCompleteness,
        PaymentTransaction,
        PrimaryCredit,
        RetryDisposition,
        SupplementaryCredit,
        Withdrawal,
    },
    side_effects::{
        CampaignStatusChanged,
        DonationSucceeded,
        FundsPooled,
        HoldingCredited,
        SideEffect,
        SurplusSettled,
    },
    traits::{CampaignTransition, CreditOutcome, CreditReceipt, FundingSettlement, LedgerError, LedgerStore},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl LedgerStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction(id, &mut conn).await?)
    }

    async fn fetch_transaction_by_order_code(
        &self,
        order_code: &OrderCode,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_by_order_code(order_code, &mut conn).await?)
    }

    async fn fetch_transactions_for_donation(&self, donation_id: i64) -> Result<Vec<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transactions_for_donation(donation_id, &mut conn).await?)
    }

    async fn fetch_donation(&self, id: i64) -> Result<Option<Donation>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(donations::fetch_donation(id, &mut conn).await?)
    }

    async fn insert_donation_intent(
        &self,
        donation: NewDonation,
        order_code: OrderCode,
    ) -> Result<(Donation, PaymentTransaction), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let donation_row = donations::insert_donation(&donation, &mut tx).await?;
        let primary =
            transactions::insert_primary(donation_row.id, &order_code, donation.amount, donation.gateway, &mut tx)
                .await?;
        tx.commit().await?;
        debug!(
            "🗃️ Donation #{} of {} to campaign {} saved with order code {order_code}",
            donation_row.id, donation_row.amount, donation_row.campaign_id
        );
        Ok((donation_row, primary))
    }

    async fn record_primary_credit(&self, credit: PrimaryCredit) -> Result<CreditOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let Some(updated) = transactions::credit_primary(&credit, &mut tx).await? else {
            debug!("🗃️ Transaction {} was processed by another delivery first", credit.transaction_id);
            return Ok(CreditOutcome::LostRace);
        };
        let receipt = credit_campaign(updated, credit.amount, false, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Transaction {} credited with {} ({}). Campaign {} now has {}",
            receipt.transaction.id,
            credit.amount,
            credit.completeness,
            receipt.campaign.id,
            receipt.campaign.received_amount
        );
        Ok(CreditOutcome::Credited(receipt))
    }

    async fn create_supplementary_transaction(
        &self,
        credit: SupplementaryCredit,
    ) -> Result<CreditOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let inserted = transactions::insert_supplementary(&credit, &mut tx).await?;
        let parent = transactions::fetch_transaction(credit.parent_id, &mut tx)
            .await?
            .ok_or(LedgerError::TransactionNotFound(credit.parent_id))?;
        let cumulative = transactions::total_credited_for_donation(inserted.donation_id, &mut tx).await?;
        let completeness = PaymentCompleteness::classify(cumulative, parent.requested_amount);
        let inserted = transactions::set_completeness(inserted.id, completeness, &mut tx).await?;
        let receipt = credit_campaign(inserted, credit.amount, true, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Supplementary transaction {} of {} recorded against {}. Donation total is now {cumulative} \
             ({completeness})",
            receipt.transaction.id, credit.amount, credit.parent_id
        );
        Ok(CreditOutcome::Credited(receipt))
    }

    async fn mark_transaction_failed(
        &self,
        id: i64,
        error_code: &str,
        error_description: &str,
    ) -> Result<Option<PaymentTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::mark_failed(id, error_code, error_description, &mut conn).await?)
    }

    async fn credit_holding_account(&self, credit: HoldingCredit) -> Result<HoldingEntry, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let entry = holding::insert_holding_entry(&credit, &mut tx).await?;
        let effect = SideEffect::HoldingCredited(HoldingCredited {
            holding_entry_id: entry.id,
            holder_id: credit.holder_id,
            amount: entry.amount,
            gateway: entry.gateway,
            external_ref: entry.external_ref.clone(),
            reason: entry.reason,
        });
        outbox::insert_event(&effect, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ {} credited to the holding account ({}) from {}", entry.amount, entry.reason, entry.external_ref);
        Ok(entry)
    }

    async fn record_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawal = holding::insert_withdrawal(&withdrawal, &mut conn).await?;
        debug!("🗃️ Withdrawal of {} recorded from {}", withdrawal.amount, withdrawal.external_ref);
        Ok(withdrawal)
    }

    async fn fetch_pending_outbox_events(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::fetch_pending(limit, now, &mut conn).await?)
    }

    async fn fetch_outbox_event(&self, id: i64) -> Result<Option<OutboxEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::fetch_event(id, &mut conn).await?)
    }

    async fn claim_outbox_event(&self, id: i64, now: DateTime<Utc>) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::claim(id, now, &mut conn).await?)
    }

    async fn complete_outbox_event(&self, id: i64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        if outbox::complete(id, &mut conn).await? == 0 {
            warn!("🗃️ Outbox event {id} was not in PROCESSING when it was completed");
        }
        Ok(())
    }

    async fn fail_outbox_event(
        &self,
        id: i64,
        error: &str,
        disposition: RetryDisposition,
    ) -> Result<OutboxEvent, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        outbox::fail(id, error, disposition, &mut conn).await?.ok_or(LedgerError::OutboxEventNotFound(id))
    }

    async fn release_stale_outbox_claims(&self, claimed_before: DateTime<Utc>) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::release_stale_claims(claimed_before, &mut conn).await?)
    }

    async fn requeue_failed_outbox_events(&self) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::requeue_failed(&mut conn).await?)
    }

    async fn fetch_campaign(&self, id: i64) -> Result<Option<Campaign>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(campaigns::fetch_campaign(id, &mut conn).await?)
    }

    async fn fetch_campaigns_due_for_activation(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(campaigns::fetch_due_for_activation(now, limit, &mut conn).await?)
    }

    async fn fetch_campaigns_due_for_completion(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(campaigns::fetch_due_for_completion(now, limit, &mut conn).await?)
    }

    async fn fetch_campaigns_due_for_expiration(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(campaigns::fetch_due_for_expiration(now, limit, &mut conn).await?)
    }

    async fn transition_campaign(&self, transition: CampaignTransition) -> Result<Option<Campaign>, LedgerError> {
        let CampaignTransition { campaign_id, from, to, reason } = transition;
        if !from.can_transition_to(to) {
            return Err(LedgerError::IllegalCampaignTransition { from, to });
        }
        let mut tx = self.pool.begin().await?;
        let Some(campaign) = campaigns::update_status(campaign_id, from, to, &mut tx).await? else {
            trace!("🗃️ Campaign {campaign_id} is no longer {from}. Transition to {to} skipped");
            return Ok(None);
        };
        let effect =
            SideEffect::CampaignStatusChanged(CampaignStatusChanged { campaign_id, from, to, reason: Some(reason) });
        outbox::insert_event(&effect, &mut tx).await?;
        if to == CampaignStatus::Ended {
            pool_funds(&campaign, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Campaign {campaign_id} moved from {from} to {to}");
        Ok(Some(campaign))
    }

    async fn complete_campaign_funding(
        &self,
        campaign_id: i64,
        threshold_percent: u32,
    ) -> Result<Option<FundingSettlement>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let Some(current) = campaigns::lock_active(campaign_id, &mut tx).await? else {
            trace!("🗃️ Campaign {campaign_id} is no longer ACTIVE. Completion skipped");
            return Ok(None);
        };
        let next = current.completion_status(threshold_percent);
        let campaign = campaigns::update_status(campaign_id, CampaignStatus::Active, next, &mut tx)
            .await?
            .ok_or(LedgerError::CampaignNotFound(campaign_id))?;
        let reason = format!(
            "Raised {} of {} (threshold {threshold_percent}%)",
            campaign.received_amount, campaign.target_amount
        );
        let effect = SideEffect::CampaignStatusChanged(CampaignStatusChanged {
            campaign_id,
            from: CampaignStatus::Active,
            to: next,
            reason: Some(reason),
        });
        outbox::insert_event(&effect, &mut tx).await?;
        let pooled = match next {
            CampaignStatus::Ended => pool_funds(&campaign, &mut tx).await?,
            _ => None,
        };
        tx.commit().await?;
        debug!("🗃️ Campaign {campaign_id} closed as {next}");
        Ok(Some(FundingSettlement { campaign, pooled }))
    }
}

/// Hands everything an ENDED campaign raised to its owner as one credit. Campaigns that raised nothing pool nothing.
async fn pool_funds(campaign: &Campaign, conn: &mut SqliteConnection) -> Result<Option<Money>, LedgerError> {
    if !campaign.received_amount.is_positive() {
        return Ok(None);
    }
    let effect = SideEffect::FundsPooled(FundsPooled {
        campaign_id: campaign.id,
        owner_id: campaign.owner_id.clone(),
        amount: campaign.received_amount,
    });
    outbox::insert_event(&effect, conn).await?;
    info!("🗃️ {} raised by campaign {} will be pooled to {}", campaign.received_amount, campaign.id, campaign.owner_id);
    Ok(Some(campaign.received_amount))
}

/// The campaign half of a credit: bump the running total, write the success event, and flag a surplus crossing.
async fn credit_campaign(
    transaction: PaymentTransaction,
    amount: Money,
    supplementary: bool,
    conn: &mut SqliteConnection,
) -> Result<CreditReceipt, LedgerError> {
    let donation = donations::fetch_donation(transaction.donation_id, &mut *conn)
        .await?
        .ok_or(LedgerError::DonationNotFound(transaction.donation_id))?;
    let count_delta = if supplementary { 0 } else { 1 };
    let campaign = campaigns::increment_received(donation.campaign_id, amount, count_delta, &mut *conn).await?;
    let mut outbox_event_ids = Vec::with_capacity(2);
    let effect = SideEffect::DonationSucceeded(DonationSucceeded {
        donation_id: donation.id,
        transaction_id: transaction.id,
        campaign_id: campaign.id,
        campaign_owner_id: campaign.owner_id.clone(),
        campaign_title: campaign.title.clone(),
        donor_id: donation.donor_id,
        donor_email: donation.donor_email,
        is_anonymous: donation.is_anonymous,
        amount,
        gateway: transaction.gateway,
        completeness: transaction.completeness,
        supplementary,
    });
    outbox_event_ids.push(outbox::insert_event(&effect, &mut *conn).await?.id);
    let before = campaign.received_amount - amount;
    let surplus_crossed = campaign.status == CampaignStatus::Active &&
        before <= campaign.target_amount &&
        campaign.received_amount > campaign.target_amount;
    if surplus_crossed {
        info!(
            "🗃️ Campaign {} passed its target of {} and now holds {}",
            campaign.id, campaign.target_amount, campaign.received_amount
        );
        let effect = SideEffect::SurplusSettled(SurplusSettled {
            campaign_id: campaign.id,
            target_amount: campaign.target_amount,
            received_amount: campaign.received_amount,
        });
        outbox_event_ids.push(outbox::insert_event(&effect, &mut *conn).await?.id);
    }
    Ok(CreditReceipt { transaction, campaign, surplus_crossed, outbox_event_ids })
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    /// Campaign CRUD lives outside this engine. This exists so that fixtures and operators can seed campaigns.
    pub async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(campaigns::insert_campaign(campaign, &mut conn).await?)
    }

    pub async fn fetch_outbox_events(&self) -> Result<Vec<OutboxEvent>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(outbox::fetch_events(&mut conn).await?)
    }

    pub async fn fetch_holding_entries(&self) -> Result<Vec<HoldingEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(holding::fetch_holding_entries(&mut conn).await?)
    }

    pub async fn fetch_withdrawals(&self) -> Result<Vec<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(holding::fetch_withdrawals(&mut conn).await?)
    }
}
