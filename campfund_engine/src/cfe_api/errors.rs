use thiserror::Error;

use crate::{
    db_types::CampaignStatus,
    side_effects::SideEffectError,
    traits::{LedgerError, WalletServiceError},
};

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Could not reconcile the transfer because of a storage error. {0}")]
    Storage(#[from] LedgerError),
}

#[derive(Debug, Clone, Error)]
pub enum DonationApiError {
    #[error("Donation amounts must be positive")]
    InvalidAmount,
    #[error("Campaign {0} does not exist")]
    CampaignNotFound(i64),
    #[error("Campaign {0} is {1} and is not accepting donations")]
    CampaignNotAcceptingDonations(i64, CampaignStatus),
    #[error("Could not allocate a unique order code")]
    OrderCodeExhausted,
    #[error("{0}")]
    Storage(#[from] LedgerError),
}

#[derive(Debug, Clone, Error)]
pub enum OutboxError {
    #[error("{0}")]
    Storage(#[from] LedgerError),
    #[error("{0}")]
    Payload(#[from] SideEffectError),
    #[error("{0}")]
    Downstream(#[from] WalletServiceError),
}

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("{0}")]
    Storage(#[from] LedgerError),
    #[error("Campaign {0} does not exist")]
    CampaignNotFound(i64),
    #[error("A campaign cannot move from {from} to {to}")]
    IllegalTransition { from: CampaignStatus, to: CampaignStatus },
    #[error("Campaign {0} changed status while the transition was in progress")]
    ConcurrentModification(i64),
}
