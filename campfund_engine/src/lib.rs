//! Campfund Engine
//!
//! The Campfund engine reconciles donation payments reported by two independent payment gateways against a durable
//! ledger, and relays the resulting side effects (wallet credits, donor statistics, notifications) to downstream services
//! reliably. It is provider-agnostic: storage, cache and wallet service are collaborators behind the traits in
//! [`mod@traits`].
//!
//! The library is divided into these main sections:
//! 1. Storage. [`SqliteDatabase`] is the ledger backend. Its data types live in [`mod@db_types`] and are public; the SQL
//!    itself is not.
//! 2. The public API ([`mod@cfe_api`]): webhook ingestion and reconciliation, donation intents, the outbox relay and the
//!    campaign scheduler.
//! 3. Collaborator implementations: [`mod@cache`] (in-memory, and Redis behind the `redis` feature) and [`mod@wallet`]
//!    (an HTTP client for the wallet service).
//!
//! The engine also emits in-process events when the outbox relay executes certain side effects, such as a campaign
//! passing its target. See [`mod@events`] for how to hook into them.
pub mod cache;
pub mod cfe_api;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod side_effects;
pub mod traits;
pub mod wallet;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use cache::MemoryCache;
pub use cfe_api::{
    donation_api::{DonationApi, DonationIntent},
    errors::{DonationApiError, OutboxError, ReconciliationError, SchedulerError},
    gateway_objects,
    idempotency::IdempotencyGuard,
    outbox_relay::{campaign_escrow_id, OutboxRelay, RelayConfig, RelayReport, RetryPolicy},
    reconciliation_api::{DiscardReason, IngestionResult, ReconciliationApi, ReconciliationOutcome, WebhookIngestor},
    scheduler_api::{BatchConfig, CampaignScheduler, ItemOutcome, JobReport, SchedulerConfig, SchedulerJob},
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
pub use traits::{Cache, CacheError, LedgerError, LedgerStore, WalletService, WalletServiceError};
pub use wallet::{HttpWalletService, WalletServiceConfig};
