//! Wire formats of the two gateway webhooks, and their conversion into [`GatewayEvent`]s.
//!
//! Both gateways add fields over time, so unknown fields are ignored. Only the fields the reconciliation engine needs
//! are required.
use campfund_engine::{
    db_types::{Money, OrderCode, TransferDirection},
    gateway_objects::{BankFeedEvent, GatewayEvent, PushGatewayEvent, TransferOutcome},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The push gateway's code for a successful payment.
pub const PUSH_SUCCESS_CODE: &str = "00";

#[derive(Debug, Clone, Error)]
pub enum WebhookPayloadError {
    #[error("The webhook payload is not valid JSON. {0}")]
    InvalidJson(String),
    #[error("The webhook payload is missing required fields. {0}")]
    InvalidShape(String),
    #[error("{0} is not a valid order code")]
    InvalidOrderCode(String),
    #[error("Unknown transfer type: {0}")]
    InvalidTransferType(String),
}

/// The gateway sends numeric order codes, but some integrations quote them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    String(String),
}

impl std::fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushWebhook {
    pub code: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub success: bool,
    pub data: PushWebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushWebhookData {
    pub order_code: NumberOrString,
    pub amount: i64,
    #[serde(default)]
    pub description: String,
    pub reference: String,
    #[serde(default)]
    pub transaction_date_time: Option<String>,
    pub payment_link_id: String,
    pub code: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankFeedWebhook {
    pub id: NumberOrString,
    pub gateway: String,
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub content: String,
    pub transfer_type: String,
    pub transfer_amount: i64,
    pub reference_code: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Parses a push gateway delivery. The original body is kept on the event for audits.
pub fn parse_push_webhook(body: &[u8]) -> Result<GatewayEvent, WebhookPayloadError> {
    let raw = serde_json::from_slice::<Value>(body).map_err(|e| WebhookPayloadError::InvalidJson(e.to_string()))?;
    let webhook = serde_json::from_value::<PushWebhook>(raw.clone())
        .map_err(|e| WebhookPayloadError::InvalidShape(e.to_string()))?;
    webhook.into_event(raw)
}

pub fn parse_bank_feed_webhook(body: &[u8]) -> Result<GatewayEvent, WebhookPayloadError> {
    let raw = serde_json::from_slice::<Value>(body).map_err(|e| WebhookPayloadError::InvalidJson(e.to_string()))?;
    let webhook = serde_json::from_value::<BankFeedWebhook>(raw.clone())
        .map_err(|e| WebhookPayloadError::InvalidShape(e.to_string()))?;
    webhook.into_event(raw)
}

impl PushWebhook {
    pub fn into_event(self, raw: Value) -> Result<GatewayEvent, WebhookPayloadError> {
        let data = self.data;
        let code = data.order_code.to_string();
        let order_code = code.parse::<OrderCode>().map_err(|_| WebhookPayloadError::InvalidOrderCode(code))?;
        // The inner code describes the payment. The outer one only describes the notification.
        let outcome = if data.code == PUSH_SUCCESS_CODE {
            TransferOutcome::Succeeded
        } else {
            TransferOutcome::Failed { code: data.code, description: data.desc }
        };
        Ok(GatewayEvent::Push(PushGatewayEvent {
            event_id: data.payment_link_id,
            order_code,
            amount: Money::from(data.amount),
            reference: data.reference,
            description: data.description,
            outcome,
            transaction_time: data.transaction_date_time,
            raw,
        }))
    }
}

impl BankFeedWebhook {
    pub fn into_event(self, raw: Value) -> Result<GatewayEvent, WebhookPayloadError> {
        let direction = match self.transfer_type.to_ascii_lowercase().as_str() {
            "in" => TransferDirection::Inbound,
            "out" => TransferDirection::Outbound,
            _ => return Err(WebhookPayloadError::InvalidTransferType(self.transfer_type)),
        };
        Ok(GatewayEvent::BankFeed(BankFeedEvent {
            event_id: self.id.to_string(),
            bank: self.gateway,
            account_number: self.account_number,
            transaction_date: self.transaction_date,
            direction,
            amount: Money::from(self.transfer_amount),
            content: self.content,
            description: self.description,
            reference_code: self.reference_code,
            raw,
        }))
    }
}
