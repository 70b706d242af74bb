use serde::{Deserialize, Serialize};

use crate::db_types::{CampaignStatus, Money};

/// A campaign's running total went past its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusDetectedEvent {
    pub campaign_id: i64,
    pub target_amount: Money,
    pub received_amount: Money,
}

impl SurplusDetectedEvent {
    pub fn new(campaign_id: i64, target_amount: Money, received_amount: Money) -> Self {
        Self { campaign_id, target_amount, received_amount }
    }

    pub fn surplus(&self) -> Money {
        self.received_amount - self.target_amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatusChangedEvent {
    pub campaign_id: i64,
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub reason: Option<String>,
}
