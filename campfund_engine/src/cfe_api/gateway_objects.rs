use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Gateway, Money, OrderCode, TransferDirection},
    helpers::extract_order_code,
};

/// A notification from one of the two payment rails, after the HTTP layer has parsed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GatewayEvent {
    Push(PushGatewayEvent),
    BankFeed(BankFeedEvent),
}

/// The push gateway issues the order code itself and sends exactly one authoritative notification per payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushGatewayEvent {
    /// The gateway's id for the payment (its payment link id), used for de-duplication
    pub event_id: String,
    pub order_code: OrderCode,
    pub amount: Money,
    pub reference: String,
    pub description: String,
    pub outcome: TransferOutcome,
    pub transaction_time: Option<String>,
    /// The notification body as delivered, kept on the transaction for audits
    pub raw: serde_json::Value,
}

/// The bank feed reports every movement on the receiving account. It knows nothing about donations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankFeedEvent {
    pub event_id: String,
    /// The bank that reported the transfer
    pub bank: String,
    pub account_number: Option<String>,
    pub transaction_date: Option<String>,
    pub direction: TransferDirection,
    pub amount: Money,
    /// The free text the sender typed. Usually, but not always, contains the order code.
    pub content: String,
    pub description: Option<String>,
    pub reference_code: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Succeeded,
    Failed { code: String, description: String },
}

impl GatewayEvent {
    pub fn gateway(&self) -> Gateway {
        match self {
            GatewayEvent::Push(_) => Gateway::Push,
            GatewayEvent::BankFeed(_) => Gateway::BankFeed,
        }
    }

    /// The `(gateway event id, reference code)` pair that identifies a delivery for de-duplication.
    pub fn fingerprint(&self) -> (&str, &str) {
        match self {
            GatewayEvent::Push(e) => (&e.event_id, &e.reference),
            GatewayEvent::BankFeed(e) => (&e.event_id, &e.reference_code),
        }
    }
}

/// A gateway event normalized into the shape the reconciliation engine works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub gateway: Gateway,
    pub external_id: String,
    pub reference_code: String,
    pub amount: Money,
    pub content: String,
    pub direction: TransferDirection,
    pub order_code: Option<OrderCode>,
    pub outcome: TransferOutcome,
    pub metadata: serde_json::Value,
}

impl TransferEvent {
    /// `<gateway>:<event id>:<reference code>`. Unique per real-world transfer, and used as the ledger's dedupe key.
    pub fn external_ref(&self) -> String {
        format!("{}:{}:{}", self.gateway, self.external_id, self.reference_code)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Succeeded)
    }
}

impl From<GatewayEvent> for TransferEvent {
    fn from(event: GatewayEvent) -> Self {
        match event {
            GatewayEvent::Push(e) => TransferEvent {
                gateway: Gateway::Push,
                external_id: e.event_id,
                reference_code: e.reference,
                amount: e.amount,
                content: e.description,
                direction: TransferDirection::Inbound,
                order_code: Some(e.order_code),
                outcome: e.outcome,
                metadata: serde_json::json!({ "push": e.raw }),
            },
            GatewayEvent::BankFeed(e) => {
                let order_code = extract_order_code(&e.content)
                    .or_else(|| e.description.as_deref().and_then(extract_order_code));
                TransferEvent {
                    gateway: Gateway::BankFeed,
                    external_id: e.event_id,
                    reference_code: e.reference_code,
                    amount: e.amount,
                    content: e.content,
                    direction: e.direction,
                    order_code,
                    outcome: TransferOutcome::Succeeded,
                    metadata: serde_json::json!({ "bank_feed": e.raw }),
                }
            },
        }
    }
}
