//! Webhook Reconciler: applies asynchronous processor events.
//!
//! Processors deliver at least once and out of order. Every handler checks
//! current state before writing, so applying an event twice is a no-op;
//! the processed-event cache only saves the store round trip.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hybridpay_ledger::{LedgerStore, UnitOfWork};
use hybridpay_types::constants::WEBHOOK_EVENT_CACHE_SIZE;
use hybridpay_types::{
    EngineConfig, NotificationKind, OrderStatus, PayoutAccountStatus, Result, Withdrawal,
    WithdrawalId, WithdrawalStatus,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::escrow;
use crate::idempotency::ProcessedEvents;
use crate::webhook::{EventAction, parse_event, verify_signature};

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    /// State changed.
    Applied,
    /// State already reflected the event.
    AlreadyApplied,
    /// Nothing to apply: unknown reference, unsupported type, or a state
    /// that needs manual follow-up.
    Ignored,
    /// Event id seen before; not re-applied.
    Duplicate,
}

pub struct WebhookReconciler {
    store: Arc<LedgerStore>,
    config: Arc<EngineConfig>,
    processed: Mutex<ProcessedEvents>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<LedgerStore>, config: Arc<EngineConfig>) -> Self {
        Self {
            store,
            config,
            processed: Mutex::new(ProcessedEvents::new(WEBHOOK_EVENT_CACHE_SIZE)),
        }
    }

    /// Authenticate, parse and apply a raw webhook delivery.
    ///
    /// # Errors
    /// `WebhookSignature` / `MalformedWebhook` without touching state. Any
    /// error while applying is returned so the sender retries; the event id
    /// is recorded only after success.
    pub async fn confirm_payment_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome> {
        self.confirm_payment_webhook_at(payload, signature, Utc::now())
            .await
    }

    /// [`Self::confirm_payment_webhook`] with an explicit clock.
    pub async fn confirm_payment_webhook_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        if let Err(e) = verify_signature(
            payload,
            signature,
            &self.config.webhook_secret,
            self.config.webhook_tolerance_secs,
            now.timestamp(),
        ) {
            tracing::warn!(error = %e, "webhook rejected");
            return Err(e);
        }
        let event = parse_event(payload)?;

        if self.processed.lock().contains(&event.id) {
            tracing::debug!(event_id = %event.id, "duplicate webhook delivery");
            return Ok(ReconcileOutcome::Duplicate);
        }

        let outcome = match &event.action {
            EventAction::PaymentSucceeded { payment_ref } => {
                self.handle_payment_confirmed(payment_ref).await?
            }
            EventAction::PayoutAccountChanged {
                account_ref,
                status,
            } => {
                self.handle_payout_account_status_changed(account_ref, *status)
                    .await?
            }
            EventAction::PayoutPaid {
                transfer_ref,
                withdrawal_ref,
            } => {
                self.handle_payout_paid(transfer_ref, withdrawal_ref.as_deref())
                    .await?
            }
            EventAction::Unsupported => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "unsupported webhook event ignored"
                );
                ReconcileOutcome::Ignored
            }
        };

        self.processed.lock().mark_processed(&event.id);
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            ?outcome,
            "webhook processed"
        );
        Ok(outcome)
    }

    /// PENDING → ACTIVE for the order paid by `payment_ref`, holding the
    /// seller's earnings in escrow.
    ///
    /// Unknown references and orders already past PENDING are successful
    /// no-ops.
    pub async fn handle_payment_confirmed(&self, payment_ref: &str) -> Result<ReconcileOutcome> {
        let Some(order) = self.store.order_by_payment_ref(payment_ref) else {
            tracing::warn!(payment_ref, "payment confirmed for unknown reference");
            return Ok(ReconcileOutcome::Ignored);
        };
        let order_id = order.id;

        let _guard = self.store.order_locks().acquire(order_id).await?;
        let outcome = self.store.transaction(|uow| {
            let order = uow.require_order(order_id)?.clone();
            match order.status {
                OrderStatus::Pending => {
                    escrow::hold(uow, order_id, Some(payment_ref))?;
                    Ok(ReconcileOutcome::Applied)
                }
                OrderStatus::Cancelled => {
                    tracing::error!(
                        %order_id,
                        buyer_id = %order.buyer_id,
                        amount = %order.external_portion,
                        payment_ref,
                        "payment confirmed for a cancelled order, manual refund required"
                    );
                    Ok(ReconcileOutcome::Ignored)
                }
                _ => Ok(ReconcileOutcome::AlreadyApplied),
            }
        })?;

        if outcome == ReconcileOutcome::Applied {
            tracing::info!(%order_id, payment_ref, "payment confirmed, escrow held");
        }
        Ok(outcome)
    }

    /// Record the new status of a connected payout account. No ledger impact.
    pub async fn handle_payout_account_status_changed(
        &self,
        account_ref: &str,
        status: PayoutAccountStatus,
    ) -> Result<ReconcileOutcome> {
        let outcome = self.store.transaction(|uow| {
            let now = uow.now();
            let Some(user_id) = uow.user_by_payout_account(account_ref).map(|u| u.id) else {
                return Ok(ReconcileOutcome::Ignored);
            };
            let user = uow.user_mut(user_id)?;
            let Some(account) = user.payout_account.as_mut() else {
                return Ok(ReconcileOutcome::Ignored);
            };
            if account.status == status {
                return Ok(ReconcileOutcome::AlreadyApplied);
            }
            account.status = status;
            account.updated_at = now;
            Ok(ReconcileOutcome::Applied)
        })?;

        match outcome {
            ReconcileOutcome::Ignored => {
                tracing::warn!(account_ref, %status, "status change for unknown payout account");
            }
            _ => tracing::info!(account_ref, %status, ?outcome, "payout account status updated"),
        }
        Ok(outcome)
    }

    /// Mark the withdrawal paid out by `transfer_ref` (or named by
    /// `withdrawal_ref`) as completed.
    pub async fn handle_payout_paid(
        &self,
        transfer_ref: &str,
        withdrawal_ref: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        let by_metadata = withdrawal_ref.and_then(|r| r.parse::<WithdrawalId>().ok());
        let found = self.store.transaction(|uow| {
            Ok(find_withdrawal(uow, transfer_ref, by_metadata).map(|w| (w.id, w.user_id)))
        })?;
        let Some((withdrawal_id, user_id)) = found else {
            tracing::warn!(transfer_ref, ?withdrawal_ref, "payout paid for unknown withdrawal");
            return Ok(ReconcileOutcome::Ignored);
        };

        let _guard = self.store.wallet_locks().acquire(user_id).await?;
        let outcome = self.store.transaction(|uow| {
            let now = uow.now();
            let withdrawal = uow.withdrawal_mut(withdrawal_id)?;
            match withdrawal.status {
                WithdrawalStatus::Completed => return Ok(ReconcileOutcome::AlreadyApplied),
                WithdrawalStatus::Rejected => {
                    tracing::error!(
                        %withdrawal_id,
                        %user_id,
                        transfer_ref,
                        "payout paid for a rejected withdrawal, funds were already returned"
                    );
                    return Ok(ReconcileOutcome::Ignored);
                }
                WithdrawalStatus::Pending => {}
            }
            withdrawal.status = WithdrawalStatus::Completed;
            withdrawal.transfer_reference.get_or_insert_with(|| transfer_ref.to_string());
            withdrawal.processed_at = Some(now);
            withdrawal.updated_at = now;
            let net = withdrawal.net_amount;
            uow.notify(
                user_id,
                NotificationKind::WithdrawalCompleted,
                "Withdrawal completed",
                format!("Your withdrawal of {net} has been paid out."),
                Some(withdrawal_id.to_string()),
            );
            Ok(ReconcileOutcome::Applied)
        })?;

        if outcome == ReconcileOutcome::Applied {
            tracing::info!(
                %withdrawal_id,
                transfer_ref,
                "withdrawal completed by payout confirmation"
            );
        }
        Ok(outcome)
    }
}

fn find_withdrawal<'u>(
    uow: &'u UnitOfWork<'_>,
    transfer_ref: &str,
    by_metadata: Option<WithdrawalId>,
) -> Option<&'u Withdrawal> {
    uow.withdrawal_by_transfer(transfer_ref)
        .or_else(|| by_metadata.and_then(|id| uow.withdrawal(id)))
}
