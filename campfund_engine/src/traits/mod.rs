//! # Collaborator contracts
//!
//! The engine never talks to storage, caches or downstream services directly. Instead it is generic over the traits in
//! this module, so that backends can be swapped, and mocked in tests.
//!
//! * [`LedgerStore`] is the durable store for transactions, donations, campaigns and the outbox. Every multi-row
//!   mutation it exposes is atomic.
//! * [`Cache`] is a short-lived key-value store used for webhook fingerprints and cached campaign views.
//! * [`WalletService`] credits wallets and sends notifications. Only the outbox relay calls it.
mod cache;
mod data_objects;
mod ledger_store;
mod wallet_service;

pub use cache::{Cache, CacheError};
pub use data_objects::{
    BadgeAward,
    CampaignTransition,
    CreditOutcome,
    CreditReceipt,
    DonationConfirmation,
    DonorStatsUpdate,
    FundingSettlement,
    WalletCredit,
};
pub use ledger_store::{LedgerError, LedgerStore};
pub use wallet_service::{WalletService, WalletServiceError};
