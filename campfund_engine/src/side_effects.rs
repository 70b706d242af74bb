//! Outbox side effects.
//!
//! Every outbox row is one [`SideEffect`]. The `event_type` column names the variant and the `payload` column holds the
//! variant's fields as JSON. The payload schemas are an internal wire contract between the ledger (which writes rows)
//! and the relay (which may be running a newer or older build). Decoding therefore ignores unknown fields, and every
//! field added after the first release must carry a serde default.
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{CampaignStatus, Gateway, HoldReason, Money, NewOutboxEvent, PaymentCompleteness};

pub const DONATION_PAYMENT_SUCCEEDED: &str = "DONATION_PAYMENT_SUCCEEDED";
pub const CAMPAIGN_SURPLUS_SETTLED: &str = "CAMPAIGN_SURPLUS_SETTLED";
pub const CAMPAIGN_FUNDS_POOLED: &str = "CAMPAIGN_FUNDS_POOLED";
pub const HOLDING_ACCOUNT_CREDITED: &str = "HOLDING_ACCOUNT_CREDITED";
pub const CAMPAIGN_STATUS_CHANGED: &str = "CAMPAIGN_STATUS_CHANGED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    DonationSucceeded(DonationSucceeded),
    SurplusSettled(SurplusSettled),
    FundsPooled(FundsPooled),
    HoldingCredited(HoldingCredited),
    CampaignStatusChanged(CampaignStatusChanged),
}

#[derive(Debug, Clone, Error)]
pub enum SideEffectError {
    #[error("Unknown outbox event type: {0}")]
    UnknownEventType(String),
    #[error("Malformed {event_type} payload. {reason}")]
    MalformedPayload { event_type: String, reason: String },
}

impl SideEffect {
    pub fn event_type(&self) -> &'static str {
        match self {
            SideEffect::DonationSucceeded(_) => DONATION_PAYMENT_SUCCEEDED,
            SideEffect::SurplusSettled(_) => CAMPAIGN_SURPLUS_SETTLED,
            SideEffect::FundsPooled(_) => CAMPAIGN_FUNDS_POOLED,
            SideEffect::HoldingCredited(_) => HOLDING_ACCOUNT_CREDITED,
            SideEffect::CampaignStatusChanged(_) => CAMPAIGN_STATUS_CHANGED,
        }
    }

    pub fn to_new_event(&self) -> Result<NewOutboxEvent, serde_json::Error> {
        let payload = match self {
            SideEffect::DonationSucceeded(p) => serde_json::to_value(p)?,
            SideEffect::SurplusSettled(p) => serde_json::to_value(p)?,
            SideEffect::FundsPooled(p) => serde_json::to_value(p)?,
            SideEffect::HoldingCredited(p) => serde_json::to_value(p)?,
            SideEffect::CampaignStatusChanged(p) => serde_json::to_value(p)?,
        };
        Ok(NewOutboxEvent { event_type: self.event_type().to_string(), payload })
    }

    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, SideEffectError> {
        match event_type {
            DONATION_PAYMENT_SUCCEEDED => decode_payload(event_type, payload).map(Self::DonationSucceeded),
            CAMPAIGN_SURPLUS_SETTLED => decode_payload(event_type, payload).map(Self::SurplusSettled),
            CAMPAIGN_FUNDS_POOLED => decode_payload(event_type, payload).map(Self::FundsPooled),
            HOLDING_ACCOUNT_CREDITED => decode_payload(event_type, payload).map(Self::HoldingCredited),
            CAMPAIGN_STATUS_CHANGED => decode_payload(event_type, payload).map(Self::CampaignStatusChanged),
            other => Err(SideEffectError::UnknownEventType(other.to_string())),
        }
    }
}

fn decode_payload<T: DeserializeOwned>(event_type: &str, payload: &serde_json::Value) -> Result<T, SideEffectError> {
    T::deserialize(payload)
        .map_err(|e| SideEffectError::MalformedPayload { event_type: event_type.to_string(), reason: e.to_string() })
}

/// A webhook credited a donation, either the first credit of the primary transaction or a supplementary top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationSucceeded {
    pub donation_id: i64,
    pub transaction_id: i64,
    pub campaign_id: i64,
    pub campaign_owner_id: String,
    #[serde(default)]
    pub campaign_title: String,
    pub donor_id: String,
    #[serde(default)]
    pub donor_email: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub amount: Money,
    pub gateway: Gateway,
    #[serde(default = "default_completeness")]
    pub completeness: PaymentCompleteness,
    #[serde(default)]
    pub supplementary: bool,
}

fn default_completeness() -> PaymentCompleteness {
    PaymentCompleteness::Completed
}

/// A credit took an ACTIVE campaign past its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurplusSettled {
    pub campaign_id: i64,
    pub target_amount: Money,
    pub received_amount: Money,
}

/// An ENDED campaign's funds are handed to its owner in one credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsPooled {
    pub campaign_id: i64,
    pub owner_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingCredited {
    pub holding_entry_id: i64,
    pub holder_id: String,
    pub amount: Money,
    pub gateway: Gateway,
    pub external_ref: String,
    pub reason: HoldReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusChanged {
    pub campaign_id: i64,
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_types_follow_the_variant() {
        let effect = SideEffect::FundsPooled(FundsPooled { campaign_id: 3, owner_id: "owner-3".into(), amount: 490.into() });
        let event = effect.to_new_event().unwrap();
        assert_eq!(event.event_type, CAMPAIGN_FUNDS_POOLED);
        assert_eq!(event.payload, json!({"campaignId": 3, "ownerId": "owner-3", "amount": 490}));
        assert_eq!(SideEffect::decode(&event.event_type, &event.payload).unwrap(), effect);
    }

    #[test]
    fn payloads_tolerate_unknown_and_missing_optional_fields() {
        // Written by an older build (no title, email, completeness or supplementary flag) and read by this one, with a
        // field from a newer build thrown in.
        let payload = json!({
            "donationId": 1,
            "transactionId": 2,
            "campaignId": 3,
            "campaignOwnerId": "owner-3",
            "donorId": "donor-1",
            "amount": 100,
            "gateway": "bank_feed",
            "loyaltyPoints": 12
        });
        let SideEffect::DonationSucceeded(p) = SideEffect::decode(DONATION_PAYMENT_SUCCEEDED, &payload).unwrap() else {
            panic!("Expected a DonationSucceeded side effect");
        };
        assert_eq!(p.amount, Money::from(100));
        assert_eq!(p.gateway, Gateway::BankFeed);
        assert_eq!(p.campaign_title, "");
        assert!(p.donor_email.is_none());
        assert!(!p.is_anonymous);
        assert!(!p.supplementary);
        assert_eq!(p.completeness, PaymentCompleteness::Completed);
    }

    #[test]
    fn unknown_event_types_are_errors() {
        let err = SideEffect::decode("CAMPAIGN_RENAMED", &json!({})).unwrap_err();
        assert!(matches!(err, SideEffectError::UnknownEventType(t) if t == "CAMPAIGN_RENAMED"));
    }

    #[test]
    fn missing_required_fields_are_errors() {
        let err = SideEffect::decode(CAMPAIGN_SURPLUS_SETTLED, &json!({"campaignId": 1})).unwrap_err();
        assert!(matches!(err, SideEffectError::MalformedPayload { .. }));
    }
}
