//! The outbox relay.
//!
//! Ledger mutations never call downstream services. They write an outbox row in the same transaction instead, and this
//! relay turns those rows into effects: it polls for due events, claims each one with a compare-and-swap, runs the side
//! effect, and records the result. A crash between claim and completion leaves the row in PROCESSING; the next cycle
//! returns such stale claims to PENDING, so every event eventually runs. Downstream calls carry idempotency keys
//! derived from the event id, which makes re-running an event harmless.
use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    cfe_api::errors::OutboxError,
    db_types::{OutboxEvent, RetryDisposition},
    events::{CampaignStatusChangedEvent, EventProducers, SurplusDetectedEvent},
    side_effects::{
        CampaignStatusChanged,
        DonationSucceeded,
        FundsPooled,
        HoldingCredited,
        SideEffect,
        SurplusSettled,
    },
    traits::{BadgeAward, Cache, DonationConfirmation, DonorStatsUpdate, LedgerStore, WalletCredit, WalletService},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_BATCH_SIZE: u32 = 50;
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

pub fn campaign_cache_key(campaign_id: i64) -> String {
    format!("campaign:{campaign_id}")
}

/// The wallet that holds a campaign's donations until they are released. Only pooling pays the owner directly.
pub fn campaign_escrow_id(campaign_id: i64) -> String {
    format!("campaign-escrow-{campaign_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before an event is dead-lettered
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_backoff: DEFAULT_BASE_BACKOFF, max_backoff: DEFAULT_MAX_BACKOFF }
    }
}

impl RetryPolicy {
    /// The delay before the next attempt, after `failures` failed attempts: `min(base × 2^(failures − 1), max)`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << exponent).min(self.max_backoff)
    }

    /// What to do with an event that has just failed, given the failures it had before this one.
    pub fn disposition(&self, previous_failures: i64, now: DateTime<Utc>) -> RetryDisposition {
        let failures = u32::try_from(previous_failures.saturating_add(1)).unwrap_or(u32::MAX);
        if failures >= self.max_attempts {
            return RetryDisposition::DeadLetter;
        }
        let delay = to_chrono(self.backoff(failures));
        RetryDisposition::RetryAt(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub batch_size: u32,
    /// A PROCESSING claim older than this belongs to a crashed cycle and is released
    pub lease_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, lease_timeout: DEFAULT_LEASE_TIMEOUT, retry_policy: RetryPolicy::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    /// Another cycle held the lease, so this one did nothing
    pub skipped: bool,
    pub released: u64,
    pub fetched: usize,
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    /// Events another worker claimed between our fetch and our claim
    pub lost_claims: usize,
}

impl RelayReport {
    fn skipped() -> Self {
        Self { skipped: true, ..Default::default() }
    }

    pub fn is_idle(&self) -> bool {
        self.fetched == 0 && self.released == 0
    }
}

pub struct OutboxRelay<B, W, C> {
    db: B,
    wallet: W,
    cache: C,
    producers: EventProducers,
    config: RelayConfig,
    lease: Mutex<()>,
}

impl<B, W, C> Debug for OutboxRelay<B, W, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OutboxRelay ({:?})", self.config)
    }
}

impl<B, W, C> OutboxRelay<B, W, C> {
    pub fn new(db: B, wallet: W, cache: C, producers: EventProducers, config: RelayConfig) -> Self {
        Self { db, wallet, cache, producers, config, lease: Mutex::new(()) }
    }
}

impl<B, W, C> OutboxRelay<B, W, C>
where
    B: LedgerStore,
    W: WalletService,
    C: Cache,
{
    /// Runs one poll cycle. Only one cycle runs at a time per relay; an overlapping call returns a skipped report
    /// straight away.
    pub async fn run_once(&self) -> Result<RelayReport, OutboxError> {
        let Ok(_lease) = self.lease.try_lock() else {
            debug!("📦️ A relay cycle is already running. Skipping this one.");
            return Ok(RelayReport::skipped());
        };
        let mut report = RelayReport::default();
        let now = Utc::now();
        let stale_before =
            now.checked_sub_signed(to_chrono(self.config.lease_timeout)).unwrap_or(DateTime::<Utc>::MIN_UTC);
        report.released = self.db.release_stale_outbox_claims(stale_before).await?;
        if report.released > 0 {
            warn!("📦️ Released {} outbox events abandoned by a previous cycle", report.released);
        }
        let events = self.db.fetch_pending_outbox_events(self.config.batch_size, now).await?;
        report.fetched = events.len();
        for event in events {
            if !self.db.claim_outbox_event(event.id, Utc::now()).await? {
                trace!("📦️ Outbox event {} was claimed elsewhere", event.id);
                report.lost_claims += 1;
                continue;
            }
            match self.dispatch(&event).await {
                Ok(()) => {
                    self.db.complete_outbox_event(event.id).await?;
                    debug!("📦️ Outbox event {} ({}) completed", event.id, event.event_type);
                    report.completed += 1;
                },
                Err(e) => {
                    let disposition = self.config.retry_policy.disposition(event.retry_count, Utc::now());
                    let failed = self.db.fail_outbox_event(event.id, &e.to_string(), disposition).await?;
                    match disposition {
                        RetryDisposition::RetryAt(at) => {
                            warn!(
                                "📦️ Outbox event {} ({}) failed on attempt {}. Retrying at {at}. {e}",
                                event.id, event.event_type, failed.retry_count
                            );
                            report.retried += 1;
                        },
                        RetryDisposition::DeadLetter => {
                            error!(
                                "📦️ Outbox event {} ({}) failed {} times and has been dead-lettered. {e}",
                                event.id, event.event_type, failed.retry_count
                            );
                            report.dead_lettered += 1;
                        },
                    }
                },
            }
        }
        Ok(report)
    }

    /// Operator action: gives every dead-lettered event a fresh retry budget.
    pub async fn requeue_failed_events(&self) -> Result<u64, OutboxError> {
        let count = self.db.requeue_failed_outbox_events().await?;
        info!("📦️ {count} dead-lettered outbox events were requeued");
        Ok(count)
    }

    async fn dispatch(&self, event: &OutboxEvent) -> Result<(), OutboxError> {
        match SideEffect::decode(&event.event_type, &event.payload.0)? {
            SideEffect::DonationSucceeded(p) => self.donation_succeeded(event.id, p).await,
            SideEffect::SurplusSettled(p) => self.surplus_settled(p).await,
            SideEffect::FundsPooled(p) => self.funds_pooled(event.id, p).await,
            SideEffect::HoldingCredited(p) => self.holding_credited(event.id, p).await,
            SideEffect::CampaignStatusChanged(p) => self.status_changed(p).await,
        }
    }

    async fn donation_succeeded(&self, event_id: i64, p: DonationSucceeded) -> Result<(), OutboxError> {
        let description = if p.supplementary {
            format!("Additional transfer for donation #{} to campaign #{}", p.donation_id, p.campaign_id)
        } else {
            format!("Donation #{} to campaign #{}", p.donation_id, p.campaign_id)
        };
        self.wallet
            .credit_wallet(WalletCredit {
                idempotency_key: format!("outbox-{event_id}-credit"),
                owner_id: campaign_escrow_id(p.campaign_id),
                amount: p.amount,
                description,
            })
            .await?;
        self.wallet
            .update_donor_stats(DonorStatsUpdate {
                idempotency_key: format!("outbox-{event_id}-stats"),
                donor_id: p.donor_id.clone(),
                campaign_id: p.campaign_id,
                amount: p.amount,
            })
            .await?;
        self.wallet
            .award_badge(BadgeAward { idempotency_key: format!("outbox-{event_id}-badge"), donor_id: p.donor_id.clone() })
            .await?;
        match p.donor_email.filter(|e| !e.trim().is_empty()) {
            Some(email) => {
                self.wallet
                    .send_donation_confirmation(DonationConfirmation {
                        idempotency_key: format!("outbox-{event_id}-confirmation"),
                        email,
                        donor_id: p.donor_id,
                        campaign_id: p.campaign_id,
                        campaign_title: p.campaign_title,
                        amount: p.amount,
                    })
                    .await?
            },
            None => trace!("📦️ Donation #{} has no contact address. No confirmation sent.", p.donation_id),
        }
        self.invalidate_campaign(p.campaign_id).await;
        Ok(())
    }

    async fn surplus_settled(&self, p: SurplusSettled) -> Result<(), OutboxError> {
        info!("📦️ Campaign {} is over target ({} of {})", p.campaign_id, p.received_amount, p.target_amount);
        let event = SurplusDetectedEvent::new(p.campaign_id, p.target_amount, p.received_amount);
        self.producers.publish_surplus_detected(event).await;
        self.invalidate_campaign(p.campaign_id).await;
        Ok(())
    }

    async fn funds_pooled(&self, event_id: i64, p: FundsPooled) -> Result<(), OutboxError> {
        debug!("📦️ Releasing {} from {} to {}", p.amount, campaign_escrow_id(p.campaign_id), p.owner_id);
        self.wallet
            .credit_wallet(WalletCredit {
                idempotency_key: format!("outbox-{event_id}-pool"),
                owner_id: p.owner_id,
                amount: p.amount,
                description: format!("Pooled funds of ended campaign #{}", p.campaign_id),
            })
            .await?;
        Ok(())
    }

    async fn holding_credited(&self, event_id: i64, p: HoldingCredited) -> Result<(), OutboxError> {
        self.wallet
            .credit_wallet(WalletCredit {
                idempotency_key: format!("outbox-{event_id}-holding"),
                owner_id: p.holder_id,
                amount: p.amount,
                description: format!("Unmatched {} transfer {} ({})", p.gateway, p.external_ref, p.reason),
            })
            .await?;
        Ok(())
    }

    async fn status_changed(&self, p: CampaignStatusChanged) -> Result<(), OutboxError> {
        let CampaignStatusChanged { campaign_id, from, to, reason } = p;
        self.producers.publish_status_changed(CampaignStatusChangedEvent { campaign_id, from, to, reason }).await;
        self.invalidate_campaign(campaign_id).await;
        Ok(())
    }

    /// Cached campaign views expire on their own, so a cache outage only delays freshness.
    async fn invalidate_campaign(&self, campaign_id: i64) {
        let key = campaign_cache_key(campaign_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!("📦️ Could not invalidate {key}. {e}");
        }
    }
}
