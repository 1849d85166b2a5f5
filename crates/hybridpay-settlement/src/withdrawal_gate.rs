//! Withdrawal Gate: balance, identity and fraud checks before money leaves.
//!
//! ```text
//! request_withdrawal
//!   ├─ amount > 0, cent precise
//!   ├─ user wallet lock
//!   ├─ identity APPROVED, balance >= amount
//!   ├─ fee breakdown (net must stay positive)
//!   ├─ routing: manual switch | crypto rail | fraud score ≠ LOW | scorer down → PENDING
//!   ├─ automatic → external transfer for the net amount (failure aborts)
//!   └─ one unit of work: debit gross (WITHDRAWAL), insert withdrawal, notify
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hybridpay_fees::compute_withdrawal_breakdown;
use hybridpay_ledger::LedgerStore;
use hybridpay_types::money::{is_cent_precise, to_cents};
use hybridpay_types::{
    BehaviorSignals, EngineConfig, HybridPayError, NotificationKind, PayoutAccountStatus, Result,
    ReviewReason, TransactionType, UserAccount, UserId, Withdrawal, WithdrawalId, WithdrawalMethod,
    WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collaborators::{FraudScorer, PayoutProvider, TransferRequest, call_with_timeout};
use crate::fee_config::FeeConfig;

/// Payout request from the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: UserId,
    /// Gross amount debited from the wallet.
    pub amount: Decimal,
    pub method: WithdrawalMethod,
    /// Crypto address. On the standard rail this may be empty or the id of
    /// the user's own connected payout account; nothing else is accepted.
    #[serde(default)]
    pub destination: String,
    /// Client IP, forwarded to fraud scoring.
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalResult {
    pub withdrawal_id: WithdrawalId,
    /// Paid out immediately rather than queued for review.
    pub immediate: bool,
    pub status: WithdrawalStatus,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub review_reason: Option<ReviewReason>,
}

pub struct WithdrawalGate {
    store: Arc<LedgerStore>,
    fees: Arc<FeeConfig>,
    payouts: Arc<dyn PayoutProvider>,
    fraud: Arc<dyn FraudScorer>,
    config: Arc<EngineConfig>,
}

impl WithdrawalGate {
    pub fn new(
        store: Arc<LedgerStore>,
        fees: Arc<FeeConfig>,
        payouts: Arc<dyn PayoutProvider>,
        fraud: Arc<dyn FraudScorer>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            fees,
            payouts,
            fraud,
            config,
        }
    }

    fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.config.collaborator_timeout_ms)
    }

    /// Request a payout of `amount` from the user's available balance.
    ///
    /// The wallet is debited exactly once, in the same unit of work that
    /// records the withdrawal. If an automatic transfer fails nothing is
    /// written and the error is retryable.
    ///
    /// # Errors
    /// `Validation`, `UserNotFound`, `NotVerified`, `InsufficientBalance`,
    /// `FeeCalculation`, `ConcurrencyConflict`, or a retryable
    /// `ExternalService` / `CollaboratorTimeout` from the transfer.
    pub async fn request_withdrawal(&self, request: WithdrawalRequest) -> Result<WithdrawalResult> {
        if request.amount <= Decimal::ZERO {
            return Err(HybridPayError::Validation {
                reason: format!("withdrawal amount must be positive, got {}", request.amount),
            });
        }
        if !is_cent_precise(request.amount) {
            return Err(HybridPayError::Validation {
                reason: format!("withdrawal amount {} has sub-cent precision", request.amount),
            });
        }

        let user_id = request.user_id;
        let _guard = self.store.wallet_locks().acquire(user_id).await?;

        let user = self
            .store
            .user(user_id)
            .ok_or(HybridPayError::UserNotFound(user_id))?;
        if !user.is_verified() {
            return Err(HybridPayError::NotVerified {
                status: user.verification_status,
            });
        }
        let balance = self
            .store
            .wallet_for_user(user_id)
            .map_or(Decimal::ZERO, |w| w.balance);
        if balance < request.amount {
            return Err(HybridPayError::InsufficientBalance {
                needed: request.amount,
                available: balance,
            });
        }

        let breakdown =
            compute_withdrawal_breakdown(request.amount, request.method, &self.fees.snapshot())?;
        let destination = resolve_destination(&user, request.method, &request.destination)?;
        let review_reason = self.route(&user, &request).await?;

        let withdrawal_id = WithdrawalId::new();
        let transfer_reference = if review_reason.is_none() {
            let transfer = self
                .transfer(withdrawal_id, user_id, breakdown.net_amount, &destination)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        %withdrawal_id,
                        %user_id,
                        amount = %request.amount,
                        net_amount = %breakdown.net_amount,
                        error = %e,
                        "payout transfer failed, withdrawal aborted"
                    );
                })?;
            Some(transfer)
        } else {
            None
        };
        let status = if transfer_reference.is_some() {
            WithdrawalStatus::Completed
        } else {
            WithdrawalStatus::Pending
        };

        let committed = self.store.transaction(|uow| {
            let now = uow.now();
            let wallet = uow.ensure_wallet(user_id);
            uow.debit(
                wallet.id,
                request.amount,
                TransactionType::Withdrawal,
                Some(withdrawal_id.to_string()),
                Some(json!({
                    "method": request.method,
                    "fee": breakdown.fee,
                    "net_amount": breakdown.net_amount,
                    "destination": destination,
                })),
            )?;
            uow.insert_withdrawal(Withdrawal {
                id: withdrawal_id,
                user_id,
                amount: request.amount,
                fee: breakdown.fee,
                net_amount: breakdown.net_amount,
                method: request.method,
                destination: destination.clone(),
                status,
                review_reason,
                transfer_reference: transfer_reference.clone(),
                rejection_reason: None,
                created_at: now,
                updated_at: now,
                processed_at: transfer_reference.as_ref().map(|_| now),
            })?;
            let (kind, title, message) = match review_reason {
                None => (
                    NotificationKind::WithdrawalCompleted,
                    "Withdrawal completed",
                    format!("{} is on its way to your payout account.", breakdown.net_amount),
                ),
                Some(_) => (
                    NotificationKind::WithdrawalUnderReview,
                    "Withdrawal under review",
                    format!(
                        "Your {} withdrawal of {} is being reviewed.",
                        request.method, request.amount
                    ),
                ),
            };
            uow.notify(user_id, kind, title, message, Some(withdrawal_id.to_string()));
            Ok(())
        });
        if let Err(e) = committed {
            if let Some(reference) = &transfer_reference {
                tracing::error!(
                    %withdrawal_id,
                    %user_id,
                    transfer_ref = %reference,
                    error = %e,
                    "transfer sent but withdrawal not recorded, reconcile manually"
                );
            }
            return Err(e);
        }

        tracing::info!(
            %withdrawal_id,
            %user_id,
            amount = %request.amount,
            fee = %breakdown.fee,
            net_amount = %breakdown.net_amount,
            method = %request.method,
            %status,
            review_reason = ?review_reason,
            "withdrawal recorded"
        );
        Ok(WithdrawalResult {
            withdrawal_id,
            immediate: status == WithdrawalStatus::Completed,
            status,
            fee: breakdown.fee,
            net_amount: breakdown.net_amount,
            review_reason,
        })
    }

    /// Decide whether the payout must wait for a human. `None` means pay
    /// automatically.
    async fn route(
        &self,
        user: &UserAccount,
        request: &WithdrawalRequest,
    ) -> Result<Option<ReviewReason>> {
        if self.config.manual_payments_enabled {
            return Ok(Some(ReviewReason::ManualPaymentsEnabled));
        }
        if request.method.is_crypto() {
            return Ok(Some(ReviewReason::CryptoRail));
        }

        let signals = BehaviorSignals {
            user_id: user.id,
            ip_address: request.ip_address.clone(),
            amount: request.amount,
            user_age_days: user.age_days(Utc::now()),
            history: self.store.behavior_history(user.id)?,
        };
        let scored = call_with_timeout(
            "fraud-scoring",
            self.collaborator_timeout(),
            self.fraud.analyze_behavior(&signals),
        )
        .await;

        Ok(match scored {
            Ok(assessment) if assessment.risk_level.allows_automatic_payout() => None,
            Ok(assessment) => {
                tracing::info!(
                    user_id = %user.id,
                    risk_level = %assessment.risk_level,
                    reasons = ?assessment.reasons,
                    "withdrawal routed to manual review"
                );
                Some(ReviewReason::ElevatedRisk)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user.id,
                    error = %e,
                    "fraud scoring unavailable, routing to manual review"
                );
                Some(ReviewReason::ScoringUnavailable)
            }
        })
    }

    async fn transfer(
        &self,
        withdrawal_id: WithdrawalId,
        user_id: UserId,
        net_amount: Decimal,
        destination: &str,
    ) -> Result<String> {
        let request = TransferRequest {
            amount_cents: to_cents(net_amount)?,
            currency: self.config.currency.clone(),
            destination: destination.to_string(),
            idempotency_key: transfer_idempotency_key(withdrawal_id),
            metadata: BTreeMap::from([
                ("withdrawal_id".to_string(), withdrawal_id.to_string()),
                ("user_id".to_string(), user_id.to_string()),
            ]),
        };
        let transfer = call_with_timeout(
            "payout-provider",
            self.collaborator_timeout(),
            self.payouts.create_transfer(request),
        )
        .await?;
        Ok(transfer.id)
    }

    /// Pay out a PENDING withdrawal after manual review.
    ///
    /// Crypto rails are paid off-platform and need the on-chain reference.
    /// On the standard rail a supplied reference records a manual payout;
    /// otherwise the transfer is made here.
    ///
    /// # Errors
    /// `WithdrawalNotFound`, `Validation` if the withdrawal is no longer
    /// pending or a crypto reference is missing, or the transfer error.
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        external_reference: Option<String>,
    ) -> Result<Withdrawal> {
        let withdrawal = self.pending_withdrawal(withdrawal_id)?;
        let _guard = self.store.wallet_locks().acquire(withdrawal.user_id).await?;
        let withdrawal = self.pending_withdrawal(withdrawal_id)?;

        let reference = match (external_reference, withdrawal.method.is_crypto()) {
            (Some(reference), _) => reference,
            (None, true) => {
                return Err(HybridPayError::Validation {
                    reason: format!(
                        "{} payouts are sent off-platform; supply the transaction reference",
                        withdrawal.method
                    ),
                });
            }
            (None, false) => {
                self.transfer(
                    withdrawal.id,
                    withdrawal.user_id,
                    withdrawal.net_amount,
                    &withdrawal.destination,
                )
                .await?
            }
        };

        let approved = self.store.transaction(|uow| {
            let now = uow.now();
            let w = uow.withdrawal_mut(withdrawal_id)?;
            if !w.is_pending() {
                return Err(not_pending(w));
            }
            w.status = WithdrawalStatus::Completed;
            w.transfer_reference = Some(reference.clone());
            w.processed_at = Some(now);
            w.updated_at = now;
            let approved = w.clone();
            uow.notify(
                approved.user_id,
                NotificationKind::WithdrawalCompleted,
                "Withdrawal completed",
                format!("Your withdrawal of {} has been paid out.", approved.net_amount),
                Some(withdrawal_id.to_string()),
            );
            Ok(approved)
        })?;
        tracing::info!(%withdrawal_id, transfer_ref = %reference, "withdrawal approved");
        Ok(approved)
    }

    /// Reject a PENDING withdrawal and return the gross amount to the
    /// wallet as a REFUND entry.
    ///
    /// # Errors
    /// `WithdrawalNotFound`, or `Validation` if it is no longer pending.
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        reason: &str,
    ) -> Result<Withdrawal> {
        let withdrawal = self.pending_withdrawal(withdrawal_id)?;
        let _guard = self.store.wallet_locks().acquire(withdrawal.user_id).await?;

        let rejected = self.store.transaction(|uow| {
            let now = uow.now();
            let w = uow.withdrawal_mut(withdrawal_id)?;
            if !w.is_pending() {
                return Err(not_pending(w));
            }
            w.status = WithdrawalStatus::Rejected;
            w.rejection_reason = Some(reason.to_string());
            w.processed_at = Some(now);
            w.updated_at = now;
            let rejected = w.clone();

            let wallet = uow.ensure_wallet(rejected.user_id);
            uow.credit(
                wallet.id,
                rejected.amount,
                TransactionType::Refund,
                Some(withdrawal_id.to_string()),
                Some(json!({ "reason": reason })),
            )?;
            uow.notify(
                rejected.user_id,
                NotificationKind::WithdrawalRejected,
                "Withdrawal rejected",
                format!("{} was returned to your wallet: {reason}", rejected.amount),
                Some(withdrawal_id.to_string()),
            );
            Ok(rejected)
        })?;
        tracing::info!(%withdrawal_id, reason, refunded = %rejected.amount, "withdrawal rejected");
        Ok(rejected)
    }

    fn pending_withdrawal(&self, withdrawal_id: WithdrawalId) -> Result<Withdrawal> {
        let withdrawal = self
            .store
            .withdrawal(withdrawal_id)
            .ok_or(HybridPayError::WithdrawalNotFound(withdrawal_id))?;
        if withdrawal.is_pending() {
            Ok(withdrawal)
        } else {
            Err(not_pending(&withdrawal))
        }
    }
}

/// Idempotency key for the payout transfer of `withdrawal_id`.
#[must_use]
pub fn transfer_idempotency_key(withdrawal_id: WithdrawalId) -> String {
    format!("withdrawal-{}", withdrawal_id.0)
}

/// Crypto rails pay to the address given. The standard rail only ever pays
/// the user's own ACTIVE payout account.
fn resolve_destination(
    user: &UserAccount,
    method: WithdrawalMethod,
    requested: &str,
) -> Result<String> {
    let requested = requested.trim();
    if method.is_crypto() {
        if requested.is_empty() {
            return Err(HybridPayError::Validation {
                reason: format!("a {method} address is required"),
            });
        }
        return Ok(requested.to_string());
    }

    let account = match &user.payout_account {
        Some(account) if account.status == PayoutAccountStatus::Active => account,
        Some(account) => {
            return Err(HybridPayError::Validation {
                reason: format!("payout account is {}, not ACTIVE", account.status),
            });
        }
        None => {
            return Err(HybridPayError::Validation {
                reason: "no payout account connected".to_string(),
            });
        }
    };
    if !requested.is_empty() && requested != account.account_ref {
        return Err(HybridPayError::Validation {
            reason: format!("destination {requested} is not the connected payout account"),
        });
    }
    Ok(account.account_ref.clone())
}

fn not_pending(withdrawal: &Withdrawal) -> HybridPayError {
    HybridPayError::Validation {
        reason: format!("withdrawal {} is {}", withdrawal.id, withdrawal.status),
    }
}

#[cfg(test)]
mod tests {
    use hybridpay_types::{ErrorKind, RiskLevel, VerificationStatus};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testing::{
        MockFraudScorer, MockPayoutProvider, connect_payout_account, register_user,
    };

    struct Bench {
        store: Arc<LedgerStore>,
        payouts: Arc<MockPayoutProvider>,
        fraud: Arc<MockFraudScorer>,
        gate: WithdrawalGate,
        user: UserId,
    }

    fn bench_with(config: EngineConfig, fraud: MockFraudScorer) -> Bench {
        let store = Arc::new(LedgerStore::default());
        let payouts = Arc::new(MockPayoutProvider::new());
        let fraud = Arc::new(fraud);
        let gate = WithdrawalGate::new(
            Arc::clone(&store),
            Arc::new(FeeConfig::default()),
            payouts.clone(),
            fraud.clone(),
            Arc::new(config),
        );
        let user = register_user(&store, VerificationStatus::Approved);
        connect_payout_account(&store, user, "acct_seller", PayoutAccountStatus::Active);
        store.deposit(user, dec!(100), None).unwrap();
        Bench {
            store,
            payouts,
            fraud,
            gate,
            user,
        }
    }

    fn bench(risk: RiskLevel) -> Bench {
        bench_with(EngineConfig::default(), MockFraudScorer::returning(risk))
    }

    fn standard(b: &Bench, amount: Decimal) -> WithdrawalRequest {
        WithdrawalRequest {
            user_id: b.user,
            amount,
            method: WithdrawalMethod::Standard,
            destination: String::new(),
            ip_address: Some("203.0.113.7".to_string()),
        }
    }

    fn balance(b: &Bench) -> Decimal {
        b.store.wallet_for_user(b.user).unwrap().balance
    }

    #[tokio::test]
    async fn low_risk_pays_out_immediately() {
        let b = bench(RiskLevel::Low);
        let result = b.gate.request_withdrawal(standard(&b, dec!(50))).await.unwrap();

        assert!(result.immediate);
        assert_eq!(result.status, WithdrawalStatus::Completed);
        assert_eq!(result.fee, dec!(0.25));
        assert_eq!(result.net_amount, dec!(49.75));
        assert_eq!(balance(&b), dec!(50));

        let transfers = b.payouts.requests();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount_cents, 4975);
        assert_eq!(transfers[0].destination, "acct_seller");

        let withdrawal = b.store.withdrawal(result.withdrawal_id).unwrap();
        assert_eq!(withdrawal.transfer_reference.as_deref(), Some("tr_1"));
        assert!(withdrawal.processed_at.is_some());
        b.store.verify_all_wallets().unwrap();
    }

    #[tokio::test]
    async fn elevated_risk_waits_for_review() {
        let b = bench(RiskLevel::Medium);
        let result = b.gate.request_withdrawal(standard(&b, dec!(50))).await.unwrap();
        assert!(!result.immediate);
        assert_eq!(result.status, WithdrawalStatus::Pending);
        assert_eq!(result.review_reason, Some(ReviewReason::ElevatedRisk));
        assert!(b.payouts.requests().is_empty());
        assert_eq!(balance(&b), dec!(50));
    }

    #[tokio::test]
    async fn scorer_failure_fails_safe() {
        let b = bench_with(EngineConfig::default(), MockFraudScorer::failing());
        let result = b.gate.request_withdrawal(standard(&b, dec!(20))).await.unwrap();
        assert_eq!(result.status, WithdrawalStatus::Pending);
        assert_eq!(result.review_reason, Some(ReviewReason::ScoringUnavailable));
        assert!(b.payouts.requests().is_empty());
    }

    #[tokio::test]
    async fn scorer_timeout_fails_safe() {
        let config = EngineConfig {
            collaborator_timeout_ms: 20,
            ..EngineConfig::default()
        };
        let slow = MockFraudScorer::with_delay(RiskLevel::Low, Duration::from_millis(500));
        let b = bench_with(config, slow);
        let result = b.gate.request_withdrawal(standard(&b, dec!(20))).await.unwrap();
        assert_eq!(result.review_reason, Some(ReviewReason::ScoringUnavailable));
        assert_ne!(result.status, WithdrawalStatus::Completed);
    }

    #[tokio::test]
    async fn manual_switch_skips_scoring() {
        let config = EngineConfig {
            manual_payments_enabled: true,
            ..EngineConfig::default()
        };
        let b = bench_with(config, MockFraudScorer::returning(RiskLevel::Low));
        let result = b.gate.request_withdrawal(standard(&b, dec!(20))).await.unwrap();
        assert_eq!(result.review_reason, Some(ReviewReason::ManualPaymentsEnabled));
        assert_eq!(b.fraud.calls(), 0);
    }

    #[tokio::test]
    async fn crypto_always_reviewed() {
        let b = bench(RiskLevel::Low);
        let mut req = standard(&b, dec!(60));
        req.method = WithdrawalMethod::Ethereum;
        req.destination = "0xabc".to_string();
        let result = b.gate.request_withdrawal(req).await.unwrap();
        assert_eq!(result.review_reason, Some(ReviewReason::CryptoRail));
        assert_eq!(result.fee, dec!(5.60));
        assert_eq!(result.net_amount, dec!(54.40));
        assert_eq!(b.fraud.calls(), 0);
    }

    #[tokio::test]
    async fn crypto_needs_address() {
        let b = bench(RiskLevel::Low);
        let mut req = standard(&b, dec!(60));
        req.method = WithdrawalMethod::Bitcoin;
        let err = b.gate.request_withdrawal(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(balance(&b), dec!(100));
    }

    #[tokio::test]
    async fn unverified_user_rejected() {
        let b = bench(RiskLevel::Low);
        let other = register_user(&b.store, VerificationStatus::Pending);
        b.store.deposit(other, dec!(100), None).unwrap();
        let mut req = standard(&b, dec!(10));
        req.user_id = other;
        let err = b.gate.request_withdrawal(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotVerified);
        assert!(b.store.withdrawals_for_user(other).is_empty());
    }

    #[tokio::test]
    async fn overdraw_rejected() {
        let b = bench(RiskLevel::Low);
        let err = b.gate.request_withdrawal(standard(&b, dec!(100.01))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(balance(&b), dec!(100));
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let b = bench(RiskLevel::Low);
        for amount in [Decimal::ZERO, dec!(-5), dec!(0.001)] {
            let err = b.gate.request_withdrawal(standard(&b, amount)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "amount {amount}");
        }
    }

    #[tokio::test]
    async fn fee_boundary_writes_nothing() {
        let b = bench(RiskLevel::Low);
        let err = b.gate.request_withdrawal(standard(&b, dec!(0.25))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeeCalculation);
        assert_eq!(balance(&b), dec!(100));
        assert!(b.store.withdrawals_for_user(b.user).is_empty());
        assert!(b.payouts.requests().is_empty());
    }

    #[tokio::test]
    async fn transfer_failure_aborts_without_debit() {
        let b = bench(RiskLevel::Low);
        b.payouts.set_failing(true);
        let err = b.gate.request_withdrawal(standard(&b, dec!(30))).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(balance(&b), dec!(100));
        assert!(b.store.withdrawals_for_user(b.user).is_empty());
    }

    #[tokio::test]
    async fn approve_pays_pending_withdrawal() {
        let b = bench(RiskLevel::High);
        let result = b.gate.request_withdrawal(standard(&b, dec!(40))).await.unwrap();

        let approved = b.gate.approve_withdrawal(result.withdrawal_id, None).await.unwrap();
        assert_eq!(approved.status, WithdrawalStatus::Completed);
        assert_eq!(approved.transfer_reference.as_deref(), Some("tr_1"));
        assert_eq!(balance(&b), dec!(60));

        let again = b.gate.approve_withdrawal(result.withdrawal_id, None).await;
        assert!(again.is_err());
        assert_eq!(b.payouts.requests().len(), 1);
    }

    #[tokio::test]
    async fn approve_crypto_requires_reference() {
        let b = bench(RiskLevel::Low);
        let mut req = standard(&b, dec!(60));
        req.method = WithdrawalMethod::Litecoin;
        req.destination = "ltc1qexample".to_string();
        let result = b.gate.request_withdrawal(req).await.unwrap();

        assert!(b.gate.approve_withdrawal(result.withdrawal_id, None).await.is_err());
        let approved = b
            .gate
            .approve_withdrawal(result.withdrawal_id, Some("0xfeed".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.transfer_reference.as_deref(), Some("0xfeed"));
        assert!(b.payouts.requests().is_empty());
    }

    #[tokio::test]
    async fn reject_refunds_gross_amount() {
        let b = bench(RiskLevel::Critical);
        let result = b.gate.request_withdrawal(standard(&b, dec!(75))).await.unwrap();
        assert_eq!(balance(&b), dec!(25));

        let rejected = b
            .gate
            .reject_withdrawal(result.withdrawal_id, "destination mismatch")
            .await
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("destination mismatch"));
        assert_eq!(balance(&b), dec!(100));
        b.store.verify_all_wallets().unwrap();

        assert!(b.gate.reject_withdrawal(result.withdrawal_id, "twice").await.is_err());
        assert_eq!(balance(&b), dec!(100));
    }

    #[tokio::test]
    async fn standard_rail_needs_active_payout_account() {
        let b = bench(RiskLevel::Low);
        connect_payout_account(&b.store, b.user, "acct_seller", PayoutAccountStatus::Restricted);
        let err = b.gate.request_withdrawal(standard(&b, dec!(10))).await.unwrap_err();
        assert!(err.to_string().contains("RESTRICTED"));
    }

    #[tokio::test]
    async fn restricted_account_blocks_explicit_destination() {
        let b = bench(RiskLevel::Low);
        connect_payout_account(&b.store, b.user, "acct_seller", PayoutAccountStatus::Restricted);
        let mut req = standard(&b, dec!(10));
        req.destination = "acct_someone_else".to_string();
        let err = b.gate.request_withdrawal(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(b.payouts.requests().is_empty());
        assert_eq!(balance(&b), dec!(100));
    }

    #[tokio::test]
    async fn standard_rail_pays_only_own_account() {
        let b = bench(RiskLevel::Low);
        let mut req = standard(&b, dec!(10));
        req.destination = "acct_someone_else".to_string();
        let err = b.gate.request_withdrawal(req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(b.payouts.requests().is_empty());
        assert!(b.store.withdrawals_for_user(b.user).is_empty());

        let mut req = standard(&b, dec!(10));
        req.destination = " acct_seller ".to_string();
        let result = b.gate.request_withdrawal(req).await.unwrap();
        assert!(result.immediate);
        assert_eq!(b.payouts.requests()[0].destination, "acct_seller");
    }
}
