//! The dual-gateway reconciliation engine.
//!
//! Two rails report donations independently and without coordinating:
//! * the push gateway knows the order code and sends one authoritative notification per payment;
//! * the bank feed sees every transfer into the account, and the order code only survives in the free transfer text.
//!
//! The same real-world transfer can therefore be reported twice, in either order, and a donor can top up a partial
//! transfer later. [`ReconciliationApi::reconcile`] decides, for one normalized transfer, whether it credits, partially
//! satisfies, overpays or supplements a donation, or belongs in the holding account. It guarantees that each logical
//! transfer is added to a campaign's total exactly once.
use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    cfe_api::{
        errors::ReconciliationError,
        gateway_objects::{GatewayEvent, TransferEvent, TransferOutcome},
        idempotency::IdempotencyGuard,
    },
    db_types::{
        Gateway,
        HoldReason,
        HoldingCredit,
        Money,
        NewWithdrawal,
        PaymentCompleteness,
        PaymentTransaction,
        PrimaryCredit,
        SupplementaryCredit,
        TransferDirection,
    },
    traits::{Cache, CreditOutcome, LedgerError, LedgerStore},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    /// The first credit against a primary transaction.
    Credited { transaction_id: i64, campaign_id: i64, amount: Money, completeness: PaymentCompleteness },
    /// Additional funds for a donation that had already been credited.
    Supplemented { transaction_id: i64, parent_id: i64, amount: Money, completeness: PaymentCompleteness },
    /// The transfer could not be tied to a donation and was credited to the holding account.
    Held { holding_entry_id: i64, reason: HoldReason },
    /// The push gateway reported a failed payment for a transaction that was still pending.
    TransactionFailed { transaction_id: i64 },
    WithdrawalRecorded { withdrawal_id: i64 },
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// The other gateway already credited this transaction. This is its late report of the same transfer.
    LaggingDuplicate { transaction_id: i64, credited_by: Gateway },
    /// The push gateway reported a transaction it had already reported.
    AlreadyProcessed { transaction_id: i64 },
    /// A failure notice arrived for a transaction that is no longer pending.
    FailureIgnored { transaction_id: i64 },
    /// A failure notice arrived for an order code nobody issued. No money moved, so there is nothing to hold.
    UnknownTransaction,
    /// The transfer's external reference was already recorded.
    AlreadyRecorded { external_ref: String },
    NonPositiveAmount,
}

impl ReconciliationOutcome {
    /// True if this outcome changed a campaign total.
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Credited { .. } | Self::Supplemented { .. })
    }
}

/// What happened to a single webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionResult {
    /// The delivery's fingerprint was already claimed.
    Duplicate,
    Processed(ReconciliationOutcome),
}

/// Result of one decision round on a transaction. `Retry` means the single-writer latch was taken by a concurrent
/// delivery between reading the row and updating it.
enum Decision {
    Done(ReconciliationOutcome),
    Retry,
}

pub struct ReconciliationApi<B> {
    db: B,
    holding_account_id: String,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi ({})", self.holding_account_id)
    }
}

impl<B> ReconciliationApi<B> {
    /// `holding_account_id` is the wallet owner that receives transfers that cannot be correlated to a donation.
    pub fn new(db: B, holding_account_id: impl Into<String>) -> Self {
        Self { db, holding_account_id: holding_account_id.into() }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> ReconciliationApi<B>
where B: LedgerStore
{
    pub async fn reconcile(&self, event: TransferEvent) -> Result<ReconciliationOutcome, ReconciliationError> {
        if event.direction == TransferDirection::Outbound {
            return self.record_withdrawal(&event).await;
        }
        if event.is_success() && !event.amount.is_positive() {
            warn!("🔄️ Ignoring {} transfer {} with non-positive amount {}", event.gateway, event.external_ref(), event.amount);
            return Ok(ReconciliationOutcome::Discarded(DiscardReason::NonPositiveAmount));
        }
        let Some(order_code) = event.order_code.as_ref() else {
            return self.hold(&event, HoldReason::NoOrderCode).await;
        };
        let Some(mut transaction) = self.db.fetch_transaction_by_order_code(order_code).await? else {
            if event.is_success() {
                return self.hold(&event, HoldReason::UnknownOrderCode).await;
            }
            debug!("🔄️ Failure notice for unknown order code {order_code}. Nothing to do.");
            return Ok(ReconciliationOutcome::Discarded(DiscardReason::UnknownTransaction));
        };
        // One re-decision is enough: after a lost race the row is processed, and processed rows never loop.
        for _ in 0..2 {
            match self.decide(&transaction, &event).await? {
                Decision::Done(outcome) => return Ok(outcome),
                Decision::Retry => {
                    debug!("🔄️ Lost the race to credit transaction {}. Re-reading it.", transaction.id);
                    transaction = self
                        .db
                        .fetch_transaction(transaction.id)
                        .await?
                        .ok_or(LedgerError::TransactionNotFound(transaction.id))?;
                },
            }
        }
        warn!("🔄️ Transaction {} kept changing underneath transfer {}", transaction.id, event.external_ref());
        Ok(ReconciliationOutcome::Discarded(DiscardReason::AlreadyProcessed { transaction_id: transaction.id }))
    }

    async fn decide(
        &self,
        transaction: &PaymentTransaction,
        event: &TransferEvent,
    ) -> Result<Decision, ReconciliationError> {
        if let TransferOutcome::Failed { code, description } = &event.outcome {
            return self.record_failure(transaction, code, description).await.map(Decision::Done);
        }
        if transaction.processed_by_webhook {
            if transaction.gateway != event.gateway {
                if event.amount != transaction.received_amount {
                    warn!(
                        "🔄️ Transaction {} was credited {} by the {} gateway, but the {} gateway reports {} for it. \
                         Holding {} for manual review.",
                        transaction.id,
                        transaction.received_amount,
                        transaction.gateway,
                        event.gateway,
                        event.amount,
                        event.external_ref()
                    );
                    return self.hold(event, HoldReason::CrossGatewayTopUp).await.map(Decision::Done);
                }
                info!(
                    "🔄️ Transaction {} was already credited by the {} gateway. Discarding the lagging {} report {}.",
                    transaction.id,
                    transaction.gateway,
                    event.gateway,
                    event.external_ref()
                );
                let reason = DiscardReason::LaggingDuplicate {
                    transaction_id: transaction.id,
                    credited_by: transaction.gateway,
                };
                return Ok(Decision::Done(ReconciliationOutcome::Discarded(reason)));
            }
            return match event.gateway {
                Gateway::Push => {
                    debug!("🔄️ Transaction {} was already processed by the push gateway", transaction.id);
                    let reason = DiscardReason::AlreadyProcessed { transaction_id: transaction.id };
                    Ok(Decision::Done(ReconciliationOutcome::Discarded(reason)))
                },
                Gateway::BankFeed => self.supplement(transaction, event).await.map(Decision::Done),
            };
        }
        self.credit(transaction, event).await
    }

    async fn credit(
        &self,
        transaction: &PaymentTransaction,
        event: &TransferEvent,
    ) -> Result<Decision, ReconciliationError> {
        let completeness = PaymentCompleteness::classify(event.amount, transaction.requested_amount);
        let external_ref = event.external_ref();
        let credit = PrimaryCredit {
            transaction_id: transaction.id,
            amount: event.amount,
            completeness,
            gateway: event.gateway,
            external_ref: external_ref.clone(),
            metadata: event.metadata.clone(),
        };
        match self.db.record_primary_credit(credit).await {
            Ok(CreditOutcome::Credited(receipt)) => {
                info!(
                    "🔄️💰️ {} credited {} to transaction {} ({completeness}, requested {}). Campaign {} is at {}",
                    event.gateway,
                    event.amount,
                    transaction.id,
                    transaction.requested_amount,
                    receipt.campaign.id,
                    receipt.campaign.received_amount
                );
                Ok(Decision::Done(ReconciliationOutcome::Credited {
                    transaction_id: transaction.id,
                    campaign_id: receipt.campaign.id,
                    amount: event.amount,
                    completeness,
                }))
            },
            Ok(CreditOutcome::LostRace) => Ok(Decision::Retry),
            Err(LedgerError::DuplicateExternalRef(external_ref)) => Ok(Decision::Done(already_recorded(external_ref))),
            Err(e) => Err(e.into()),
        }
    }

    async fn supplement(
        &self,
        parent: &PaymentTransaction,
        event: &TransferEvent,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let credit = SupplementaryCredit {
            parent_id: parent.id,
            amount: event.amount,
            gateway: event.gateway,
            external_ref: event.external_ref(),
            metadata: event.metadata.clone(),
        };
        match self.db.create_supplementary_transaction(credit).await {
            Ok(CreditOutcome::Credited(receipt)) => {
                info!(
                    "🔄️💰️ Supplementary transfer of {} recorded against transaction {} as transaction {} ({})",
                    event.amount, parent.id, receipt.transaction.id, receipt.transaction.completeness
                );
                Ok(ReconciliationOutcome::Supplemented {
                    transaction_id: receipt.transaction.id,
                    parent_id: parent.id,
                    amount: event.amount,
                    completeness: receipt.transaction.completeness,
                })
            },
            Ok(CreditOutcome::LostRace) => {
                Ok(ReconciliationOutcome::Discarded(DiscardReason::AlreadyProcessed { transaction_id: parent.id }))
            },
            Err(LedgerError::DuplicateExternalRef(external_ref)) => Ok(already_recorded(external_ref)),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_failure(
        &self,
        transaction: &PaymentTransaction,
        code: &str,
        description: &str,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        if transaction.processed_by_webhook {
            debug!("🔄️ Ignoring failure notice ({code}) for processed transaction {}", transaction.id);
            return Ok(ReconciliationOutcome::Discarded(DiscardReason::FailureIgnored {
                transaction_id: transaction.id,
            }));
        }
        match self.db.mark_transaction_failed(transaction.id, code, description).await? {
            Some(_) => {
                info!("🔄️❌️ Transaction {} failed at the push gateway: [{code}] {description}", transaction.id);
                Ok(ReconciliationOutcome::TransactionFailed { transaction_id: transaction.id })
            },
            None => Ok(ReconciliationOutcome::Discarded(DiscardReason::FailureIgnored {
                transaction_id: transaction.id,
            })),
        }
    }

    async fn hold(&self, event: &TransferEvent, reason: HoldReason) -> Result<ReconciliationOutcome, ReconciliationError> {
        let credit = HoldingCredit {
            holder_id: self.holding_account_id.clone(),
            external_ref: event.external_ref(),
            gateway: event.gateway,
            amount: event.amount,
            content: event.content.clone(),
            reason,
        };
        match self.db.credit_holding_account(credit).await {
            Ok(entry) => {
                info!(
                    "🔄️🏦️ {} from {} credited to the holding account ({reason}). Content: '{}'",
                    entry.amount, entry.external_ref, entry.content
                );
                Ok(ReconciliationOutcome::Held { holding_entry_id: entry.id, reason })
            },
            Err(LedgerError::DuplicateExternalRef(external_ref)) => Ok(already_recorded(external_ref)),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_withdrawal(&self, event: &TransferEvent) -> Result<ReconciliationOutcome, ReconciliationError> {
        let withdrawal = NewWithdrawal {
            external_ref: event.external_ref(),
            gateway: event.gateway,
            amount: event.amount,
            content: event.content.clone(),
        };
        match self.db.record_withdrawal(withdrawal).await {
            Ok(w) => Ok(ReconciliationOutcome::WithdrawalRecorded { withdrawal_id: w.id }),
            Err(LedgerError::DuplicateExternalRef(external_ref)) => Ok(already_recorded(external_ref)),
            Err(e) => Err(e.into()),
        }
    }
}

fn already_recorded(external_ref: String) -> ReconciliationOutcome {
    debug!("🔄️ Transfer {external_ref} has already been recorded");
    ReconciliationOutcome::Discarded(DiscardReason::AlreadyRecorded { external_ref })
}

/// The full ingestion pipeline for one webhook delivery: idempotency guard, then reconciliation.
pub struct WebhookIngestor<B, C> {
    guard: IdempotencyGuard<C>,
    api: ReconciliationApi<B>,
}

impl<B, C> WebhookIngestor<B, C> {
    pub fn new(guard: IdempotencyGuard<C>, api: ReconciliationApi<B>) -> Self {
        Self { guard, api }
    }

    pub fn api(&self) -> &ReconciliationApi<B> {
        &self.api
    }
}

impl<B, C> WebhookIngestor<B, C>
where
    B: LedgerStore,
    C: Cache,
{
    /// Storage errors release the fingerprint before they are returned, so the gateway's own retry is not mistaken for
    /// a duplicate.
    pub async fn ingest(&self, event: GatewayEvent) -> Result<IngestionResult, ReconciliationError> {
        let (event_id, reference) = event.fingerprint();
        let (event_id, reference) = (event_id.to_string(), reference.to_string());
        if self.guard.claim(&event_id, &reference).await {
            info!("🔄️ Duplicate {} delivery {event_id}/{reference} ignored", event.gateway());
            return Ok(IngestionResult::Duplicate);
        }
        match self.api.reconcile(TransferEvent::from(event)).await {
            Ok(outcome) => Ok(IngestionResult::Processed(outcome)),
            Err(e) => {
                error!("🔄️ Reconciliation of {event_id}/{reference} failed. {e}");
                self.guard.release(&event_id, &reference).await;
                Err(e)
            },
        }
    }
}
