use std::fmt::Display;

use campfund_engine::{
    db_types::{Gateway, Money, NewDonation, OrderCode},
    DonationIntent,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRequest {
    pub campaign_id: i64,
    pub donor_id: String,
    #[serde(default)]
    pub donor_email: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_gateway")]
    pub gateway: Gateway,
}

fn default_gateway() -> Gateway {
    Gateway::Push
}

impl From<DonationRequest> for NewDonation {
    fn from(req: DonationRequest) -> Self {
        let mut donation = NewDonation::new(req.campaign_id, req.donor_id, req.amount, req.gateway);
        donation.donor_email = req.donor_email;
        donation.is_anonymous = req.is_anonymous;
        donation.message = req.message;
        donation
    }
}

/// What the donor needs to make the payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationIntentResponse {
    pub donation_id: i64,
    pub transaction_id: i64,
    pub campaign_id: i64,
    pub amount: Money,
    pub gateway: Gateway,
    pub order_code: OrderCode,
    pub transfer_content: String,
}

impl From<DonationIntent> for DonationIntentResponse {
    fn from(intent: DonationIntent) -> Self {
        Self {
            donation_id: intent.donation.id,
            transaction_id: intent.transaction.id,
            campaign_id: intent.donation.campaign_id,
            amount: intent.donation.amount,
            gateway: intent.transaction.gateway,
            order_code: intent.order_code,
            transfer_content: intent.transfer_content,
        }
    }
}
