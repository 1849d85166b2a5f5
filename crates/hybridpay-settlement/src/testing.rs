//! In-memory collaborators and store fixtures.
//!
//! Compiled for this crate's tests and under the `test-helpers` feature.
//! Mocks record every request so callers can assert on what would have
//! been sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hybridpay_ledger::LedgerStore;
use hybridpay_types::{
    BehaviorSignals, FeeRates, HybridPayError, Listing, ListingId, PayoutAccount,
    PayoutAccountStatus, Result, RiskAssessment, RiskLevel, UserAccount, UserId,
    VerificationStatus,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::collaborators::{
    FeeConfigSource, FraudScorer, PaymentIntent, PaymentIntentRequest, PaymentProcessor,
    PayoutProvider, Transfer, TransferRequest,
};
use crate::webhook::sign_payload;

fn unavailable(service: &str) -> HybridPayError {
    HybridPayError::ExternalService {
        service: service.to_string(),
        reason: "simulated outage".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Payment processor
// ---------------------------------------------------------------------------

/// Issues `pi_N` intents. The same idempotency key returns the same intent.
#[derive(Debug, Default)]
pub struct MockPaymentProcessor {
    failing: AtomicBool,
    delay: Option<Duration>,
    next_id: AtomicU64,
    requests: Mutex<Vec<PaymentIntentRequest>>,
    by_key: Mutex<HashMap<String, PaymentIntent>>,
}

impl MockPaymentProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every request after `delay`.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every request received, including failed ones.
    #[must_use]
    pub fn requests(&self) -> Vec<PaymentIntentRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("mock-payments"));
        }
        let mut by_key = self.by_key.lock();
        let intent = by_key
            .entry(request.idempotency_key)
            .or_insert_with(|| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                PaymentIntent {
                    id: format!("pi_{n}"),
                    client_secret: format!("pi_{n}_secret"),
                }
            })
            .clone();
        Ok(intent)
    }
}

// ---------------------------------------------------------------------------
// Payout provider
// ---------------------------------------------------------------------------

/// Issues `tr_N` transfers. The same idempotency key returns the same transfer.
#[derive(Debug, Default)]
pub struct MockPayoutProvider {
    failing: AtomicBool,
    next_id: AtomicU64,
    requests: Mutex<Vec<TransferRequest>>,
    by_key: Mutex<HashMap<String, Transfer>>,
}

impl MockPayoutProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PayoutProvider for MockPayoutProvider {
    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer> {
        self.requests.lock().push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("mock-payouts"));
        }
        let mut by_key = self.by_key.lock();
        let transfer = by_key
            .entry(request.idempotency_key)
            .or_insert_with(|| Transfer {
                id: format!("tr_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            })
            .clone();
        Ok(transfer)
    }
}

// ---------------------------------------------------------------------------
// Fraud scorer
// ---------------------------------------------------------------------------

/// Returns a fixed risk level, fails, or answers slowly.
#[derive(Debug)]
pub struct MockFraudScorer {
    level: RiskLevel,
    failing: bool,
    delay: Option<Duration>,
    calls: AtomicU64,
    last_signals: Mutex<Option<BehaviorSignals>>,
}

impl MockFraudScorer {
    #[must_use]
    pub fn returning(level: RiskLevel) -> Self {
        Self {
            level,
            failing: false,
            delay: None,
            calls: AtomicU64::new(0),
            last_signals: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::returning(RiskLevel::Low)
        }
    }

    /// Answers `level` after `delay`.
    #[must_use]
    pub fn with_delay(level: RiskLevel, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(level)
        }
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_signals(&self) -> Option<BehaviorSignals> {
        self.last_signals.lock().clone()
    }
}

#[async_trait]
impl FraudScorer for MockFraudScorer {
    async fn analyze_behavior(&self, signals: &BehaviorSignals) -> Result<RiskAssessment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_signals.lock() = Some(signals.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(unavailable("mock-fraud"));
        }
        Ok(RiskAssessment {
            risk_level: self.level,
            reasons: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fee config source
// ---------------------------------------------------------------------------

/// Serves fixed rates, or is unreachable.
#[derive(Debug, Clone)]
pub struct StaticFeeSource {
    rates: Option<FeeRates>,
}

impl StaticFeeSource {
    #[must_use]
    pub fn new(rates: FeeRates) -> Self {
        Self { rates: Some(rates) }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self { rates: None }
    }
}

#[async_trait]
impl FeeConfigSource for StaticFeeSource {
    async fn load_fee_rates(&self) -> Result<FeeRates> {
        self.rates.clone().ok_or_else(|| unavailable("fee-config"))
    }
}

// ---------------------------------------------------------------------------
// Store fixtures
// ---------------------------------------------------------------------------

/// Register an account with the given identity status.
pub fn register_user(store: &LedgerStore, verification: VerificationStatus) -> UserId {
    let mut user = UserAccount::new(UserId::new(), Utc::now());
    user.verification_status = verification;
    let id = user.id;
    store.put_user(user);
    id
}

/// Attach (or replace) the user's connected payout account.
///
/// # Panics
/// If the user is not registered.
pub fn connect_payout_account(
    store: &LedgerStore,
    user_id: UserId,
    account_ref: &str,
    status: PayoutAccountStatus,
) {
    let Some(mut user) = store.user(user_id) else {
        panic!("{user_id} is not registered");
    };
    user.payout_account = Some(PayoutAccount {
        account_ref: account_ref.to_string(),
        status,
        updated_at: Utc::now(),
    });
    store.put_user(user);
}

/// Publish an active listing with a 24 hour delivery window.
pub fn list_item(
    store: &LedgerStore,
    seller_id: UserId,
    unit_price: Decimal,
    stock: u32,
) -> ListingId {
    let listing = Listing {
        id: ListingId::new(),
        seller_id,
        title: "Digital item".to_string(),
        unit_price,
        stock,
        delivery_time_hours: 24,
        active: true,
    };
    let id = listing.id;
    store.put_listing(listing);
    id
}

/// Serialize `event` and sign it the way the processor would.
#[must_use]
pub fn signed_event(secret: &str, timestamp: i64, event: &serde_json::Value) -> (Vec<u8>, String) {
    let body = event.to_string().into_bytes();
    let signature = sign_payload(&body, secret, timestamp);
    (body, signature)
}
