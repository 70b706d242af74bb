use std::fmt::Debug;

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    cfe_api::errors::DonationApiError,
    db_types::{CampaignStatus, Donation, NewDonation, OrderCode, PaymentTransaction},
    helpers::suggested_transfer_content,
    traits::{LedgerError, LedgerStore},
};

const ORDER_CODE_ATTEMPTS: usize = 5;

/// Everything a donor needs to go and pay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationIntent {
    pub donation: Donation,
    pub transaction: PaymentTransaction,
    pub order_code: OrderCode,
    /// Bank-feed payers must include this text (or at least the order code in it) in their transfer
    pub transfer_content: String,
}

/// `DonationApi` opens new donations. The order code it issues is the key both gateways later report against.
pub struct DonationApi<B> {
    db: B,
}

impl<B> Debug for DonationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DonationApi")
    }
}

impl<B> DonationApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> DonationApi<B>
where B: LedgerStore
{
    pub async fn create_donation_intent(&self, donation: NewDonation) -> Result<DonationIntent, DonationApiError> {
        if !donation.amount.is_positive() {
            return Err(DonationApiError::InvalidAmount);
        }
        let campaign = self
            .db
            .fetch_campaign(donation.campaign_id)
            .await?
            .ok_or(DonationApiError::CampaignNotFound(donation.campaign_id))?;
        if campaign.status != CampaignStatus::Active {
            return Err(DonationApiError::CampaignNotAcceptingDonations(campaign.id, campaign.status));
        }
        // Codes are time-based with a 3-digit random suffix, so two intents in the same millisecond can collide
        for attempt in 1..=ORDER_CODE_ATTEMPTS {
            let order_code = OrderCode::generate(Utc::now());
            match self.db.insert_donation_intent(donation.clone(), order_code.clone()).await {
                Ok((donation, transaction)) => {
                    info!(
                        "🎁️ Donation #{} of {} to campaign {} opened with order code {order_code}",
                        donation.id, donation.amount, donation.campaign_id
                    );
                    let transfer_content = suggested_transfer_content(&order_code);
                    return Ok(DonationIntent { donation, transaction, order_code, transfer_content });
                },
                Err(LedgerError::DuplicateOrderCode(code)) => {
                    warn!("🎁️ Order code {code} collided (attempt {attempt} of {ORDER_CODE_ATTEMPTS})");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Err(DonationApiError::OrderCodeExhausted)
    }
}
