use thiserror::Error;

use crate::traits::data_objects::{BadgeAward, DonationConfirmation, DonorStatsUpdate, WalletCredit};

/// The downstream wallet and notification service.
///
/// These calls happen only from the outbox relay, never from inside a ledger transaction. Each request carries an
/// idempotency key derived from the outbox event, so that a retried event does not repeat an effect that the
/// downstream service has already applied.
#[allow(async_fn_in_trait)]
pub trait WalletService {
    async fn credit_wallet(&self, credit: WalletCredit) -> Result<(), WalletServiceError>;

    async fn update_donor_stats(&self, update: DonorStatsUpdate) -> Result<(), WalletServiceError>;

    async fn send_donation_confirmation(&self, confirmation: DonationConfirmation) -> Result<(), WalletServiceError>;

    async fn award_badge(&self, award: BadgeAward) -> Result<(), WalletServiceError>;
}

#[derive(Debug, Clone, Error)]
pub enum WalletServiceError {
    #[error("Could not reach the wallet service. {0}")]
    Unreachable(String),
    #[error("The wallet service did not respond in time")]
    Timeout,
    #[error("The wallet service rejected the request with status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid wallet service configuration. {0}")]
    Configuration(String),
}
