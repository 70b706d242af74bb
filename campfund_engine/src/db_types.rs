use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use campfund_common::Money;
use log::error;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderCode        -------------------------------------------------------
/// The cross-gateway correlation key of a primary payment transaction.
///
/// Order codes are 16 decimal digits: the 13-digit millisecond timestamp of the donation intent followed by a 3-digit
/// random suffix. The push gateway echoes the code back verbatim; the bank feed only sees it inside the free-text
/// transfer content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderCode(String);

pub const ORDER_CODE_LENGTH: usize = 16;

impl OrderCode {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix = rand::thread_rng().gen_range(0..1000);
        Self(format!("{:013}{suffix:03}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderCode {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == ORDER_CODE_LENGTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(ConversionError(format!("'{s}' is not a {ORDER_CODE_LENGTH}-digit order code")))
        }
    }
}

impl Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//--------------------------------------         Gateway         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    /// Generates the order code itself and delivers one authoritative notification per transaction.
    Push,
    /// Reports raw bank transfers. Correlation has to be recovered from the transfer content.
    BankFeed,
}

impl Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gateway::Push => write!(f, "push"),
            Gateway::BankFeed => write!(f, "bank_feed"),
        }
    }
}

impl FromStr for Gateway {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "bank_feed" => Ok(Self::BankFeed),
            s => Err(ConversionError(format!("Invalid gateway: {s}"))),
        }
    }
}

//--------------------------------------    TransactionStatus    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------   PaymentCompleteness   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentCompleteness {
    Pending,
    Partial,
    Completed,
    Overpaid,
}

impl PaymentCompleteness {
    /// Exact comparison of what arrived against what was asked for.
    pub fn classify(received: Money, requested: Money) -> Self {
        use std::cmp::Ordering::*;
        match received.cmp(&requested) {
            Less => Self::Partial,
            Equal => Self::Completed,
            Greater => Self::Overpaid,
        }
    }
}

impl Display for PaymentCompleteness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentCompleteness::Pending => write!(f, "PENDING"),
            PaymentCompleteness::Partial => write!(f, "PARTIAL"),
            PaymentCompleteness::Completed => write!(f, "COMPLETED"),
            PaymentCompleteness::Overpaid => write!(f, "OVERPAID"),
        }
    }
}

//--------------------------------------   TransferDirection     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Inbound,
    Outbound,
}

//--------------------------------------   PaymentTransaction    -------------------------------------------------------
/// One attempted or completed transfer tied to a donation.
///
/// A donation has exactly one primary transaction (the one carrying the order code) and zero or more supplementary
/// transactions (no order code, `parent_id` pointing at the primary).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub donation_id: i64,
    pub parent_id: Option<i64>,
    pub order_code: Option<OrderCode>,
    pub requested_amount: Money,
    pub received_amount: Money,
    pub status: TransactionStatus,
    pub completeness: PaymentCompleteness,
    pub gateway: Gateway,
    pub processed_by_webhook: bool,
    /// `<gateway>:<event id>:<reference code>` of the transfer that credited this row
    pub external_ref: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn is_supplementary(&self) -> bool {
        self.parent_id.is_some()
    }
}

//--------------------------------------        Donation         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Donation {
    pub id: i64,
    pub campaign_id: i64,
    pub donor_id: String,
    pub donor_email: Option<String>,
    pub amount: Money,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDonation {
    pub campaign_id: i64,
    pub donor_id: String,
    #[serde(default)]
    pub donor_email: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// The rail the donor intends to pay through. Either rail may end up crediting the transaction.
    pub gateway: Gateway,
}

impl NewDonation {
    pub fn new(campaign_id: i64, donor_id: impl Into<String>, amount: Money, gateway: Gateway) -> Self {
        Self {
            campaign_id,
            donor_id: donor_id.into(),
            donor_email: None,
            amount,
            is_anonymous: false,
            message: None,
            gateway,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.donor_email = Some(email.into());
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.is_anonymous = true;
        self
    }
}

//--------------------------------------     CampaignStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    /// Submitted, awaiting review
    Pending,
    /// Approved, waiting for its start date
    Approved,
    /// Accepting donations
    Active,
    /// Funded well enough that the campaign is being executed
    Processing,
    Completed,
    Rejected,
    Cancelled,
    /// Closed without reaching the funding threshold. Received funds are pooled to the owner.
    Ended,
}

impl CampaignStatus {
    /// The campaign lifecycle transition table.
    ///
    /// | From \ To  | Approved | Active | Processing | Completed | Rejected | Cancelled | Ended |
    /// |------------|----------|--------|------------|-----------|----------|-----------|-------|
    /// | Pending    | ✔        |        |            |           | ✔        |           |       |
    /// | Approved   |          | ✔      |            |           |          | ✔         |       |
    /// | Active     |          |        | ✔          |           |          |           | ✔     |
    /// | Processing |          |        |            | ✔         |          |           |       |
    ///
    /// Completed, Rejected, Cancelled and Ended are absorbing.
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | Rejected) | (Approved, Active | Cancelled) | (Active, Processing | Ended) |
                (Processing, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled | Self::Ended)
    }
}

impl Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CampaignStatus::Pending => "PENDING",
            CampaignStatus::Approved => "APPROVED",
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Processing => "PROCESSING",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Rejected => "REJECTED",
            CampaignStatus::Cancelled => "CANCELLED",
            CampaignStatus::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

impl FromStr for CampaignStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "ACTIVE" => Ok(Self::Active),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "REJECTED" => Ok(Self::Rejected),
            "CANCELLED" => Ok(Self::Cancelled),
            "ENDED" => Ok(Self::Ended),
            s => Err(ConversionError(format!("Invalid campaign status: {s}"))),
        }
    }
}

impl From<String> for CampaignStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid campaign status: {value}. But this conversion cannot fail. Defaulting to Pending");
            CampaignStatus::Pending
        })
    }
}

//--------------------------------------        Campaign         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub target_amount: Money,
    pub received_amount: Money,
    pub donation_count: i64,
    pub status: CampaignStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Where an ACTIVE campaign goes when it closes: `Processing` if at least `threshold_percent`% of the target was
    /// raised, `Ended` otherwise.
    pub fn completion_status(&self, threshold_percent: u32) -> CampaignStatus {
        if self.received_amount.reaches_percentage_of(self.target_amount, threshold_percent) {
            CampaignStatus::Processing
        } else {
            CampaignStatus::Ended
        }
    }

    pub fn is_due_for_completion(&self, now: DateTime<Utc>) -> bool {
        self.end_date <= now || self.received_amount >= self.target_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub owner_id: String,
    pub title: String,
    pub target_amount: Money,
    pub status: CampaignStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

//--------------------------------------      OutboxStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    /// Dead letter. The retry policy was exhausted and only an operator requeue will revive the event.
    Failed,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "PENDING"),
            OutboxStatus::Processing => write!(f, "PROCESSING"),
            OutboxStatus::Completed => write!(f, "COMPLETED"),
            OutboxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------       OutboxEvent       -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i64,
    pub event_type: String,
    pub payload: Json<serde_json::Value>,
    pub status: OutboxStatus,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// What to do with an outbox event whose side effect just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    RetryAt(DateTime<Utc>),
    DeadLetter,
}

//--------------------------------------      HoldingEntry       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// The transfer content did not contain an order code
    NoOrderCode,
    /// An order code was found, but no transaction carries it
    UnknownOrderCode,
    /// The other gateway already credited the transaction, and this transfer's amount shows it is a different one
    CrossGatewayTopUp,
}

impl Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldReason::NoOrderCode => write!(f, "no order code"),
            HoldReason::UnknownOrderCode => write!(f, "unknown order code"),
            HoldReason::CrossGatewayTopUp => write!(f, "top-up through another gateway"),
        }
    }
}

/// A transfer that could not be tied to a donation and was credited to the general holding account instead.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HoldingEntry {
    pub id: i64,
    pub external_ref: String,
    pub gateway: Gateway,
    pub amount: Money,
    pub content: String,
    pub reason: HoldReason,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct HoldingCredit {
    pub holder_id: String,
    pub external_ref: String,
    pub gateway: Gateway,
    pub amount: Money,
    pub content: String,
    pub reason: HoldReason,
}

//--------------------------------------       Withdrawal        -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub external_ref: String,
    pub gateway: Gateway,
    pub amount: Money,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub external_ref: String,
    pub gateway: Gateway,
    pub amount: Money,
    pub content: String,
}

//--------------------------------------     Ledger credits      -------------------------------------------------------
/// The first webhook credit against a primary transaction.
#[derive(Debug, Clone)]
pub struct PrimaryCredit {
    pub transaction_id: i64,
    pub amount: Money,
    pub completeness: PaymentCompleteness,
    pub gateway: Gateway,
    pub external_ref: String,
    pub metadata: serde_json::Value,
}

/// Additional funds arriving for a transaction that has already been credited once.
#[derive(Debug, Clone)]
pub struct SupplementaryCredit {
    pub parent_id: i64,
    pub amount: Money,
    pub gateway: Gateway,
    pub external_ref: String,
    pub metadata: serde_json::Value,
}
