use serde::{Deserialize, Serialize};

use crate::db_types::{Campaign, CampaignStatus, Money, PaymentTransaction};

//--------------------------------------     Ledger results      -------------------------------------------------------
#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Credited(CreditReceipt),
    /// The conditional update matched nothing because another delivery processed the transaction first.
    LostRace,
}

#[derive(Debug, Clone)]
pub struct CreditReceipt {
    pub transaction: PaymentTransaction,
    /// The campaign as it stands after the increment
    pub campaign: Campaign,
    /// True if this credit took an ACTIVE campaign from at-or-below its target to above it
    pub surplus_crossed: bool,
    pub outbox_event_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct CampaignTransition {
    pub campaign_id: i64,
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub reason: String,
}

impl CampaignTransition {
    pub fn new(campaign_id: i64, from: CampaignStatus, to: CampaignStatus, reason: impl Into<String>) -> Self {
        Self { campaign_id, from, to, reason: reason.into() }
    }
}

#[derive(Debug, Clone)]
pub struct FundingSettlement {
    pub campaign: Campaign,
    /// The amount handed to the owner's wallet when the campaign ENDED with funds
    pub pooled: Option<Money>,
}

//--------------------------------------  Wallet service calls   -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCredit {
    pub idempotency_key: String,
    pub owner_id: String,
    pub amount: Money,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorStatsUpdate {
    pub idempotency_key: String,
    pub donor_id: String,
    pub campaign_id: i64,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationConfirmation {
    pub idempotency_key: String,
    pub email: String,
    pub donor_id: String,
    pub campaign_id: i64,
    pub campaign_title: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeAward {
    pub idempotency_key: String,
    pub donor_id: String,
}
