//! `HybridPayEngine`: the store, fee snapshot and the three money-moving
//! components wired together behind the interfaces the API layer calls.

use std::sync::Arc;
use std::time::Duration;

use hybridpay_ledger::LedgerStore;
use hybridpay_types::{
    EngineConfig, FeeRates, OrderId, Result, UserId, WalletSummary, Withdrawal, WithdrawalId,
};
use tokio::task::JoinHandle;

use crate::collaborators::{FeeConfigSource, FraudScorer, PaymentProcessor, PayoutProvider};
use crate::coordinator::{CreateOrderRequest, OrderSettlementResult, SettlementCoordinator};
use crate::fee_config::FeeConfig;
use crate::lifecycle::DisputeResolution;
use crate::reconciler::{ReconcileOutcome, WebhookReconciler};
use crate::stripe::StripeGateway;
use crate::sweeper;
use crate::withdrawal_gate::{WithdrawalGate, WithdrawalRequest, WithdrawalResult};

/// Remote services the engine calls.
#[derive(Clone)]
pub struct Collaborators {
    pub payments: Arc<dyn PaymentProcessor>,
    pub payouts: Arc<dyn PayoutProvider>,
    pub fraud: Arc<dyn FraudScorer>,
    /// Persistent fee configuration. Without one the startup rates stay in
    /// effect.
    pub fee_source: Option<Arc<dyn FeeConfigSource>>,
}

impl Collaborators {
    /// Stripe for payments and payouts.
    pub fn stripe(secret_key: impl Into<String>, fraud: Arc<dyn FraudScorer>) -> Self {
        let gateway = Arc::new(StripeGateway::new(secret_key));
        Self {
            payments: gateway.clone(),
            payouts: gateway,
            fraud,
            fee_source: None,
        }
    }
}

pub struct HybridPayEngine {
    store: Arc<LedgerStore>,
    fees: Arc<FeeConfig>,
    config: Arc<EngineConfig>,
    coordinator: Arc<SettlementCoordinator>,
    reconciler: WebhookReconciler,
    gate: WithdrawalGate,
    fee_source: Option<Arc<dyn FeeConfigSource>>,
}

impl HybridPayEngine {
    /// Build an engine over a fresh in-memory store.
    ///
    /// # Errors
    /// `Configuration` if `config` or `rates` fail validation.
    pub fn new(
        config: EngineConfig,
        rates: FeeRates,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let store = Arc::new(LedgerStore::new(Duration::from_millis(config.lock_timeout_ms)));
        Self::with_store(store, config, rates, collaborators)
    }

    /// Build an engine over an existing store.
    ///
    /// # Errors
    /// `Configuration` if `config` or `rates` fail validation.
    pub fn with_store(
        store: Arc<LedgerStore>,
        config: EngineConfig,
        rates: FeeRates,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;
        rates.validate()?;
        if config.webhook_secret.is_empty() {
            tracing::warn!("webhook secret not configured, every webhook will be rejected");
        }

        let config = Arc::new(config);
        let fees = Arc::new(FeeConfig::new(rates));
        let coordinator = Arc::new(SettlementCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&fees),
            collaborators.payments,
            Arc::clone(&config),
        ));
        let reconciler = WebhookReconciler::new(Arc::clone(&store), Arc::clone(&config));
        let gate = WithdrawalGate::new(
            Arc::clone(&store),
            Arc::clone(&fees),
            collaborators.payouts,
            collaborators.fraud,
            Arc::clone(&config),
        );

        tracing::info!(
            version = hybridpay_types::constants::VERSION,
            currency = %config.currency,
            manual_payments = config.manual_payments_enabled,
            "{} engine ready",
            hybridpay_types::constants::ENGINE_NAME
        );
        Ok(Self {
            store,
            fees,
            config,
            coordinator,
            reconciler,
            gate,
            fee_source: collaborators.fee_source,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn fee_config(&self) -> &FeeConfig {
        &self.fees
    }

    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler {
        &self.reconciler
    }

    #[must_use]
    pub fn withdrawals(&self) -> &WithdrawalGate {
        &self.gate
    }

    // ---- Exposed interfaces ------------------------------------------------

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderSettlementResult> {
        self.coordinator.create_order(request).await
    }

    pub async fn confirm_payment_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<ReconcileOutcome> {
        self.reconciler
            .confirm_payment_webhook(payload, signature)
            .await
    }

    pub async fn request_withdrawal(&self, request: WithdrawalRequest) -> Result<WithdrawalResult> {
        self.gate.request_withdrawal(request).await
    }

    /// Balances plus the most recent ledger entries, newest first.
    #[must_use]
    pub fn wallet_summary(&self, user_id: UserId) -> WalletSummary {
        self.store
            .wallet_summary(user_id, self.config.recent_transactions_limit)
    }

    // ---- Lifecycle ---------------------------------------------------------

    pub async fn retry_payment_intent(
        &self,
        order_id: OrderId,
        buyer_id: UserId,
    ) -> Result<OrderSettlementResult> {
        self.coordinator
            .retry_payment_intent(order_id, buyer_id)
            .await
    }

    pub async fn mark_delivered(&self, order_id: OrderId, seller_id: UserId) -> Result<()> {
        self.coordinator.mark_delivered(order_id, seller_id).await
    }

    pub async fn confirm_delivery(&self, order_id: OrderId, buyer_id: UserId) -> Result<()> {
        self.coordinator.confirm_delivery(order_id, buyer_id).await
    }

    pub async fn open_dispute(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<()> {
        self.coordinator
            .open_dispute(order_id, user_id, reason)
            .await
    }

    pub async fn resolve_dispute(
        &self,
        order_id: OrderId,
        resolution: DisputeResolution,
        note: &str,
    ) -> Result<()> {
        self.coordinator
            .resolve_dispute(order_id, resolution, note)
            .await
    }

    pub async fn cancel_pending_order(&self, order_id: OrderId, reason: &str) -> Result<()> {
        self.coordinator.cancel_pending_order(order_id, reason).await
    }

    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        external_reference: Option<String>,
    ) -> Result<Withdrawal> {
        self.gate
            .approve_withdrawal(withdrawal_id, external_reference)
            .await
    }

    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        reason: &str,
    ) -> Result<Withdrawal> {
        self.gate.reject_withdrawal(withdrawal_id, reason).await
    }

    // ---- Maintenance -------------------------------------------------------

    /// Reload fee rates from the configured source. Returns whether the
    /// snapshot changed; without a source this is a no-op.
    pub async fn refresh_fees(&self) -> bool {
        match &self.fee_source {
            Some(source) => {
                let timeout = Duration::from_millis(self.config.collaborator_timeout_ms);
                self.fees.refresh(source.as_ref(), timeout).await
            }
            None => false,
        }
    }

    /// Start the expiry / auto-confirm sweeper at the configured interval.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        sweeper::spawn_sweeper(
            Arc::clone(&self.coordinator),
            Duration::from_secs(self.config.sweep_interval_secs.max(1)),
        )
    }

    /// Replay every wallet's ledger. Returns the number of wallets checked.
    ///
    /// # Errors
    /// `LedgerInvariantViolation` on the first wallet whose history does not
    /// reproduce its balances.
    pub fn verify_ledger(&self) -> Result<usize> {
        self.store.verify_all_wallets()
    }
}

#[cfg(test)]
mod tests {
    use hybridpay_types::ErrorKind;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testing::{
        MockFraudScorer, MockPaymentProcessor, MockPayoutProvider, StaticFeeSource,
    };

    fn collaborators(fee_source: Option<Arc<dyn FeeConfigSource>>) -> Collaborators {
        Collaborators {
            payments: Arc::new(MockPaymentProcessor::new()),
            payouts: Arc::new(MockPayoutProvider::new()),
            fraud: Arc::new(MockFraudScorer::returning(hybridpay_types::RiskLevel::Low)),
            fee_source,
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let config = EngineConfig {
            currency: String::new(),
            ..EngineConfig::default()
        };
        let err = HybridPayEngine::new(config, FeeRates::default(), collaborators(None))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn invalid_rates_rejected() {
        let rates = FeeRates {
            buyer_service_flat: dec!(-1),
            ..FeeRates::default()
        };
        assert!(HybridPayEngine::new(EngineConfig::default(), rates, collaborators(None)).is_err());
    }

    #[tokio::test]
    async fn refresh_uses_configured_source() {
        let rates = FeeRates {
            seller_commission_percent: dec!(0.15),
            ..FeeRates::default()
        };
        let engine = HybridPayEngine::new(
            EngineConfig::default(),
            FeeRates::default(),
            collaborators(Some(Arc::new(StaticFeeSource::new(rates)))),
        )
        .unwrap();
        assert!(engine.refresh_fees().await);
        assert_eq!(engine.fee_config().snapshot().seller_commission_percent, dec!(0.15));

        let bare =
            HybridPayEngine::new(EngineConfig::default(), FeeRates::default(), collaborators(None))
                .unwrap();
        assert!(!bare.refresh_fees().await);
    }

    #[test]
    fn unknown_user_has_empty_summary() {
        let engine =
            HybridPayEngine::new(EngineConfig::default(), FeeRates::default(), collaborators(None))
                .unwrap();
        let summary = engine.wallet_summary(UserId::new());
        assert_eq!(summary.balance, rust_decimal::Decimal::ZERO);
        assert!(summary.recent_transactions.is_empty());
        assert_eq!(engine.verify_ledger().unwrap(), 0);
    }

    #[test]
    fn stripe_collaborators_share_one_gateway() {
        let fraud: Arc<dyn FraudScorer> = Arc::new(MockFraudScorer::failing());
        let collaborators = Collaborators::stripe("sk_test_123", fraud);
        assert!(collaborators.fee_source.is_none());
    }
}
