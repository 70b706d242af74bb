//! Time-driven campaign lifecycle jobs.
//!
//! Three jobs move campaigns along the lifecycle:
//! * **Activation** starts APPROVED campaigns whose start date has arrived.
//! * **Completion** closes ACTIVE campaigns that ran out of time or reached their target. Campaigns that raised at least
//!   the pooling threshold go to PROCESSING; the rest are ENDED and what they raised is pooled to the owner.
//! * **Expiration** rejects PENDING and cancels APPROVED campaigns that were never started before their end date.
//!
//! Each job fetches a bounded set of candidates and works through it in fixed-size batches. Items in a batch run
//! concurrently, each after a small random delay, and one item failing never stops the others. Every transition is a
//! compare-and-swap on the campaign status, so overlapping runs (or a second scheduler instance) are harmless: the loser
//! simply records a skip.
use std::{fmt::Display, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use log::*;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    cfe_api::errors::SchedulerError,
    db_types::{Campaign, CampaignStatus, Money},
    traits::{CampaignTransition, LedgerStore},
};

pub const DEFAULT_FETCH_LIMIT: u32 = 500;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(250);
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_POOLING_THRESHOLD_PERCENT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// The most candidates a single job run will look at
    pub fetch_limit: u32,
    pub batch_size: usize,
    /// Each item waits a random time in `[0, max_jitter)` before it runs
    pub max_jitter: Duration,
    pub inter_batch_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            batch_size: DEFAULT_BATCH_SIZE,
            max_jitter: DEFAULT_MAX_JITTER,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub batch: BatchConfig,
    pub pooling_threshold_percent: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { batch: BatchConfig::default(), pooling_threshold_percent: DEFAULT_POOLING_THRESHOLD_PERCENT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerJob {
    Activation,
    Completion,
    Expiration,
}

impl Display for SchedulerJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerJob::Activation => write!(f, "activation"),
            SchedulerJob::Completion => write!(f, "completion"),
            SchedulerJob::Expiration => write!(f, "expiration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemOutcome {
    Transitioned { campaign_id: i64, from: CampaignStatus, to: CampaignStatus, pooled: Option<Money> },
    Skipped { campaign_id: i64, reason: String },
    Failed { campaign_id: i64, error: String },
}

impl ItemOutcome {
    pub fn campaign_id(&self) -> i64 {
        match self {
            ItemOutcome::Transitioned { campaign_id, .. } |
            ItemOutcome::Skipped { campaign_id, .. } |
            ItemOutcome::Failed { campaign_id, .. } => *campaign_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job: SchedulerJob,
    pub started_at: DateTime<Utc>,
    pub candidates: usize,
    pub batches: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl JobReport {
    fn new(job: SchedulerJob, started_at: DateTime<Utc>) -> Self {
        Self { job, started_at, candidates: 0, batches: 0, outcomes: Vec::new() }
    }

    pub fn transitioned(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Transitioned { .. })).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Skipped { .. })).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Failed { .. })).count()
    }

    pub fn outcome_for(&self, campaign_id: i64) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| o.campaign_id() == campaign_id)
    }
}

impl Display for JobReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} job: {} candidates in {} batches. {} transitioned, {} skipped, {} failed",
            self.job,
            self.candidates,
            self.batches,
            self.transitioned(),
            self.skipped(),
            self.failed()
        )
    }
}

pub struct CampaignScheduler<B> {
    db: B,
    config: SchedulerConfig,
}

impl<B> std::fmt::Debug for CampaignScheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CampaignScheduler ({:?})", self.config)
    }
}

impl<B> CampaignScheduler<B>
where B: LedgerStore
{
    pub fn new(db: B, config: SchedulerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn run_job(&self, job: SchedulerJob, now: DateTime<Utc>) -> Result<JobReport, SchedulerError> {
        match job {
            SchedulerJob::Activation => self.run_activation(now).await,
            SchedulerJob::Completion => self.run_completion(now).await,
            SchedulerJob::Expiration => self.run_expiration(now).await,
        }
    }

    pub async fn run_activation(&self, now: DateTime<Utc>) -> Result<JobReport, SchedulerError> {
        let candidates = self.db.fetch_campaigns_due_for_activation(now, self.config.batch.fetch_limit).await?;
        self.process(SchedulerJob::Activation, now, candidates).await
    }

    pub async fn run_completion(&self, now: DateTime<Utc>) -> Result<JobReport, SchedulerError> {
        let candidates = self.db.fetch_campaigns_due_for_completion(now, self.config.batch.fetch_limit).await?;
        self.process(SchedulerJob::Completion, now, candidates).await
    }

    pub async fn run_expiration(&self, now: DateTime<Utc>) -> Result<JobReport, SchedulerError> {
        let candidates = self.db.fetch_campaigns_due_for_expiration(now, self.config.batch.fetch_limit).await?;
        self.process(SchedulerJob::Expiration, now, candidates).await
    }

    /// An operator-driven transition. The same transition table as the timed jobs applies, and the change is recorded
    /// on the outbox in the same way.
    pub async fn transition_campaign(
        &self,
        campaign_id: i64,
        to: CampaignStatus,
        reason: &str,
    ) -> Result<Campaign, SchedulerError> {
        let campaign =
            self.db.fetch_campaign(campaign_id).await?.ok_or(SchedulerError::CampaignNotFound(campaign_id))?;
        let from = campaign.status;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::IllegalTransition { from, to });
        }
        let transition = CampaignTransition::new(campaign_id, from, to, reason);
        let updated =
            self.db.transition_campaign(transition).await?.ok_or(SchedulerError::ConcurrentModification(campaign_id))?;
        info!("🗓️ Campaign {campaign_id} was moved from {from} to {to} by an operator. {reason}");
        Ok(updated)
    }

    async fn process(
        &self,
        job: SchedulerJob,
        now: DateTime<Utc>,
        candidates: Vec<Campaign>,
    ) -> Result<JobReport, SchedulerError> {
        let mut report = JobReport::new(job, now);
        report.candidates = candidates.len();
        if candidates.is_empty() {
            trace!("🗓️ Nothing is due for {job}");
            return Ok(report);
        }
        let batch_size = self.config.batch.batch_size.max(1);
        for (i, batch) in candidates.chunks(batch_size).enumerate() {
            if i > 0 && !self.config.batch.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch.inter_batch_delay).await;
            }
            let items = batch.iter().map(|campaign| {
                let delay = self.jitter();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.handle(job, campaign).await
                }
            });
            report.outcomes.extend(join_all(items).await);
            report.batches += 1;
        }
        Ok(report)
    }

    async fn handle(&self, job: SchedulerJob, campaign: &Campaign) -> ItemOutcome {
        match job {
            SchedulerJob::Activation => self.activate(campaign).await,
            SchedulerJob::Completion => self.complete(campaign).await,
            SchedulerJob::Expiration => self.expire(campaign).await,
        }
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.config.batch.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }

    async fn activate(&self, campaign: &Campaign) -> ItemOutcome {
        let reason = format!("Start date {} reached", campaign.start_date);
        self.apply(campaign, CampaignStatus::Active, reason).await
    }

    async fn expire(&self, campaign: &Campaign) -> ItemOutcome {
        let to = match campaign.status {
            CampaignStatus::Pending => CampaignStatus::Rejected,
            CampaignStatus::Approved => CampaignStatus::Cancelled,
            other => {
                return ItemOutcome::Skipped { campaign_id: campaign.id, reason: format!("{other} campaigns do not expire") }
            },
        };
        let reason = format!("End date {} passed before the campaign started", campaign.end_date);
        self.apply(campaign, to, reason).await
    }

    async fn complete(&self, campaign: &Campaign) -> ItemOutcome {
        let threshold = self.config.pooling_threshold_percent;
        match self.db.complete_campaign_funding(campaign.id, threshold).await {
            Ok(Some(settlement)) => {
                let to = settlement.campaign.status;
                match settlement.pooled {
                    Some(amount) => info!("🗓️ Campaign {} ended short of its threshold. {amount} pooled", campaign.id),
                    None => info!("🗓️ Campaign {} closed as {to}", campaign.id),
                }
                ItemOutcome::Transitioned {
                    campaign_id: campaign.id,
                    from: CampaignStatus::Active,
                    to,
                    pooled: settlement.pooled,
                }
            },
            Ok(None) => ItemOutcome::Skipped {
                campaign_id: campaign.id,
                reason: "Campaign was no longer ACTIVE".to_string(),
            },
            Err(e) => {
                error!("🗓️ Could not complete campaign {}. {e}", campaign.id);
                ItemOutcome::Failed { campaign_id: campaign.id, error: e.to_string() }
            },
        }
    }

    async fn apply(&self, campaign: &Campaign, to: CampaignStatus, reason: String) -> ItemOutcome {
        let from = campaign.status;
        let transition = CampaignTransition::new(campaign.id, from, to, &reason);
        match self.db.transition_campaign(transition).await {
            Ok(Some(_)) => {
                info!("🗓️ Campaign {} moved from {from} to {to}. {reason}", campaign.id);
                ItemOutcome::Transitioned { campaign_id: campaign.id, from, to, pooled: None }
            },
            Ok(None) => ItemOutcome::Skipped {
                campaign_id: campaign.id,
                reason: format!("Campaign was no longer {from}"),
            },
            Err(e) => {
                error!("🗓️ Could not move campaign {} from {from} to {to}. {e}", campaign.id);
                ItemOutcome::Failed { campaign_id: campaign.id, error: e.to_string() }
            },
        }
    }
}
