//! # Campfund engine public API
//!
//! The `cfe_api` module exposes the programmatic API of the engine. Each API is generic over the collaborator traits in
//! [`crate::traits`], so the same code runs against SQLite in production and against mocks in tests.
//!
//! * [`reconciliation_api`] turns verified gateway events into ledger changes. [`WebhookIngestor`] wraps it with the
//!   fingerprint check that drops redeliveries.
//! * [`donation_api`] records donation intents and hands out the order codes donors quote in their transfers.
//! * [`outbox_relay`] executes the side effects that ledger mutations leave on the outbox.
//! * [`scheduler_api`] moves campaigns through their lifecycle on a timer.
//!
//! # API usage
//!
//! ```rust,ignore
//! use campfund_engine::{MemoryCache, ReconciliationApi, SqliteDatabase, WebhookIngestor, IdempotencyGuard};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = ReconciliationApi::new(db, "holding-account");
//! let ingestor = WebhookIngestor::new(IdempotencyGuard::new(MemoryCache::default()), api);
//! let result = ingestor.ingest(event).await?;
//! ```
//!
//! [`WebhookIngestor`]: reconciliation_api::WebhookIngestor

pub mod donation_api;
pub mod errors;
pub mod gateway_objects;
pub mod idempotency;
pub mod outbox_relay;
pub mod reconciliation_api;
pub mod scheduler_api;
