//! End-to-end flows through `HybridPayEngine` with in-memory collaborators.
//!
//! Default fee rates throughout: 3% + 0.50 buyer service fee, 10% seller
//! commission, 5% membership discount, 0.25 flat on standard withdrawals.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use hybridpay_ledger::LedgerStore;
use hybridpay_settlement::coordinator::payment_idempotency_key;
use hybridpay_settlement::testing::{
    MockFraudScorer, MockPaymentProcessor, MockPayoutProvider, connect_payout_account, list_item,
    register_user, signed_event,
};
use hybridpay_settlement::withdrawal_gate::transfer_idempotency_key;
use hybridpay_settlement::{
    Collaborators, CreateOrderRequest, DisputeResolution, HybridPayEngine, OrderSettlementResult,
    ReconcileOutcome, WithdrawalRequest,
};
use hybridpay_types::{
    EngineConfig, ErrorKind, EscrowStatus, FeeRates, ListingId, OrderStatus, PayoutAccountStatus,
    ReviewReason, RiskLevel, TimelineEvent, TransactionType, UserId, VerificationStatus,
    WithdrawalMethod, WithdrawalStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

const SECRET: &str = "whsec_end_to_end";

/// Engine plus handles on its mocks.
struct Harness {
    engine: HybridPayEngine,
    payments: Arc<MockPaymentProcessor>,
    payouts: Arc<MockPayoutProvider>,
    fraud: Arc<MockFraudScorer>,
}

impl Harness {
    fn new() -> Self {
        Self::with_fraud(MockFraudScorer::returning(RiskLevel::Low))
    }

    fn with_fraud(fraud: MockFraudScorer) -> Self {
        let payments = Arc::new(MockPaymentProcessor::new());
        let payouts = Arc::new(MockPayoutProvider::new());
        let fraud = Arc::new(fraud);
        let config = EngineConfig {
            webhook_secret: SECRET.to_string(),
            ..EngineConfig::default()
        };
        let engine = HybridPayEngine::new(
            config,
            FeeRates::default(),
            Collaborators {
                payments: payments.clone(),
                payouts: payouts.clone(),
                fraud: fraud.clone(),
                fee_source: None,
            },
        )
        .expect("default config is valid");
        Self {
            engine,
            payments,
            payouts,
            fraud,
        }
    }

    fn store(&self) -> &LedgerStore {
        self.engine.store()
    }

    fn user_with_balance(&self, balance: Decimal) -> UserId {
        let user = register_user(self.store(), VerificationStatus::Approved);
        if balance > Decimal::ZERO {
            self.store()
                .deposit(user, balance, Some("seed".to_string()))
                .expect("seed deposit");
        }
        user
    }

    fn balance(&self, user: UserId) -> (Decimal, Decimal) {
        let summary = self.engine.wallet_summary(user);
        (summary.balance, summary.pending_balance)
    }

    async fn buy(&self, buyer: UserId, listing: ListingId) -> OrderSettlementResult {
        self.engine
            .create_order(CreateOrderRequest {
                buyer_id: buyer,
                listing_id: listing,
                quantity: 1,
                membership_discount_requested: false,
            })
            .await
            .expect("order should settle")
    }

    async fn payment_succeeded(&self, event_id: &str, payment_ref: &str) -> ReconcileOutcome {
        let (body, signature) = signed_event(
            SECRET,
            Utc::now().timestamp(),
            &json!({
                "id": event_id,
                "type": "payment_intent.succeeded",
                "data": {"object": {"id": payment_ref}}
            }),
        );
        self.engine
            .confirm_payment_webhook(&body, &signature)
            .await
            .expect("webhook should apply")
    }
}

// =========================================================================
// Checkout
// =========================================================================

#[tokio::test]
async fn hybrid_checkout_then_webhook_holds_escrow() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(40));
    let listing = list_item(h.store(), seller, dec!(100), 5);

    let result = h.buy(buyer, listing).await;
    assert_eq!(result.status, OrderStatus::Pending);
    assert_eq!(result.total, dec!(103.50));
    assert_eq!(result.wallet_portion_used, dec!(40));
    assert_eq!(result.external_portion, dec!(63.50));
    assert_eq!(result.client_token.as_deref(), Some("pi_1_secret"));

    let requests = h.payments.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount_cents, 6350);
    assert_eq!(requests[0].idempotency_key, payment_idempotency_key(result.order_id));

    assert_eq!(h.balance(buyer), (Decimal::ZERO, Decimal::ZERO));
    assert_eq!(h.balance(seller), (Decimal::ZERO, Decimal::ZERO));
    assert_eq!(h.store().listing(listing).unwrap().stock, 4);

    assert_eq!(h.payment_succeeded("evt_1", "pi_1").await, ReconcileOutcome::Applied);

    let order = h.store().order(result.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Active);
    assert_eq!(order.escrow_status, EscrowStatus::Held);
    let paid_at = order.paid_at.expect("paid_at set on activation");
    assert_eq!(order.delivery_deadline, Some(paid_at + ChronoDuration::hours(24)));
    assert_eq!(h.balance(seller), (Decimal::ZERO, dec!(90)));

    let events: Vec<_> = h
        .store()
        .timeline(result.order_id)
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert_eq!(
        events,
        vec![
            TimelineEvent::OrderCreated,
            TimelineEvent::PaymentIntentCreated,
            TimelineEvent::PaymentConfirmed,
        ]
    );
    assert_eq!(h.engine.verify_ledger().unwrap(), 2);
}

#[tokio::test]
async fn wallet_funded_order_completes_and_pays_seller() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(200));
    let listing = list_item(h.store(), seller, dec!(100), 1);

    let result = h.buy(buyer, listing).await;
    assert_eq!(result.status, OrderStatus::Active);
    assert_eq!(result.external_portion, Decimal::ZERO);
    assert!(result.client_token.is_none());
    assert!(h.payments.requests().is_empty());
    assert_eq!(h.balance(buyer), (dec!(96.50), Decimal::ZERO));
    assert_eq!(h.balance(seller), (Decimal::ZERO, dec!(90)));

    h.engine.mark_delivered(result.order_id, seller).await.unwrap();
    h.engine.confirm_delivery(result.order_id, buyer).await.unwrap();

    let order = h.store().order(result.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.escrow_status, EscrowStatus::Released);
    assert_eq!(h.balance(seller), (dec!(90), Decimal::ZERO));
    h.engine.verify_ledger().unwrap();
}

#[tokio::test]
async fn membership_discount_needs_entitlement() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let member = h.user_with_balance(dec!(500));
    let mut account = h.store().user(member).unwrap();
    account.membership_discount_active = true;
    h.store().put_user(account);
    let other = h.user_with_balance(dec!(500));
    let listing = list_item(h.store(), seller, dec!(100), 10);

    let request = |buyer_id| CreateOrderRequest {
        buyer_id,
        listing_id: listing,
        quantity: 1,
        membership_discount_requested: true,
    };
    let discounted = h.engine.create_order(request(member)).await.unwrap();
    let undiscounted = h.engine.create_order(request(other)).await.unwrap();

    // 100 - 5 = 95; 95 * 3% + 0.50 = 3.35
    assert_eq!(discounted.total, dec!(98.35));
    assert_eq!(undiscounted.total, dec!(103.50));
    // Earnings are on the undiscounted subtotal both times.
    assert_eq!(h.balance(seller).1, dec!(180));
}

#[tokio::test]
async fn self_purchase_and_oversell_are_rejected() {
    let h = Harness::new();
    let seller = h.user_with_balance(dec!(500));
    let buyer = h.user_with_balance(dec!(500));
    let listing = list_item(h.store(), seller, dec!(20), 2);

    let err = h
        .engine
        .create_order(CreateOrderRequest {
            buyer_id: seller,
            listing_id: listing,
            quantity: 1,
            membership_discount_requested: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .create_order(CreateOrderRequest {
            buyer_id: buyer,
            listing_id: listing,
            quantity: 3,
            membership_discount_requested: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(h.store().order_count(), 0);
    assert_eq!(h.store().listing(listing).unwrap().stock, 2);
    assert_eq!(h.balance(buyer).0, dec!(500));
}

#[tokio::test]
async fn payment_intent_failure_leaves_retryable_pending_order() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(10));
    let listing = list_item(h.store(), seller, dec!(50), 1);

    h.payments.set_failing(true);
    let err = h
        .engine
        .create_order(CreateOrderRequest {
            buyer_id: buyer,
            listing_id: listing,
            quantity: 1,
            membership_discount_requested: false,
        })
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let orders = h.store().unpaid_orders_created_before(Utc::now() + ChronoDuration::minutes(1));
    assert_eq!(orders.len(), 1);
    let order = h.store().order(orders[0]).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.payment_reference.is_none());

    h.payments.set_failing(false);
    let retried = h.engine.retry_payment_intent(order.id, buyer).await.unwrap();
    assert!(retried.client_token.is_some());
    assert!(h.store().order(order.id).unwrap().payment_reference.is_some());
}

// =========================================================================
// Webhooks
// =========================================================================

#[tokio::test]
async fn redelivered_payment_event_credits_escrow_once() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(Decimal::ZERO);
    let listing = list_item(h.store(), seller, dec!(100), 1);
    h.buy(buyer, listing).await;

    assert_eq!(h.payment_succeeded("evt_a", "pi_1").await, ReconcileOutcome::Applied);
    assert_eq!(h.payment_succeeded("evt_a", "pi_1").await, ReconcileOutcome::Duplicate);
    // Same payment, different event id.
    assert_eq!(h.payment_succeeded("evt_b", "pi_1").await, ReconcileOutcome::AlreadyApplied);
    assert_eq!(h.payment_succeeded("evt_c", "pi_unknown").await, ReconcileOutcome::Ignored);

    assert_eq!(h.balance(seller).1, dec!(90));
    let wallet = h.store().wallet_for_user(seller).unwrap();
    let sales = h
        .store()
        .wallet_transactions(wallet.id)
        .into_iter()
        .filter(|tx| tx.tx_type == TransactionType::Sale)
        .count();
    assert_eq!(sales, 1);
}

#[tokio::test]
async fn forged_webhook_changes_nothing() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(Decimal::ZERO);
    let listing = list_item(h.store(), seller, dec!(30), 1);
    let result = h.buy(buyer, listing).await;

    let event = json!({
        "id": "evt_forged",
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": "pi_1"}}
    });
    let (body, signature) = signed_event("whsec_attacker", Utc::now().timestamp(), &event);
    let err = h
        .engine
        .confirm_payment_webhook(&body, &signature)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WebhookRejected);

    let (body, stale) = signed_event(SECRET, Utc::now().timestamp() - 3_600, &event);
    assert!(h.engine.confirm_payment_webhook(&body, &stale).await.is_err());

    assert_eq!(h.store().order(result.order_id).unwrap().status, OrderStatus::Pending);
    assert_eq!(h.balance(seller).1, Decimal::ZERO);
}

#[tokio::test]
async fn cancelled_order_restores_wallet_and_ignores_late_payment() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(40));
    let listing = list_item(h.store(), seller, dec!(100), 5);
    let result = h.buy(buyer, listing).await;

    h.engine
        .cancel_pending_order(result.order_id, "buyer abandoned checkout")
        .await
        .unwrap();
    assert_eq!(h.balance(buyer).0, dec!(40));
    assert_eq!(h.store().listing(listing).unwrap().stock, 5);

    assert_eq!(h.payment_succeeded("evt_late", "pi_1").await, ReconcileOutcome::Ignored);
    assert_eq!(h.store().order(result.order_id).unwrap().status, OrderStatus::Cancelled);
    assert_eq!(h.balance(seller).1, Decimal::ZERO);
    h.engine.verify_ledger().unwrap();
}

#[tokio::test]
async fn payout_account_webhook_updates_status() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    connect_payout_account(h.store(), seller, "acct_9", PayoutAccountStatus::Pending);

    let (body, signature) = signed_event(
        SECRET,
        Utc::now().timestamp(),
        &json!({
            "id": "evt_acct",
            "type": "account.updated",
            "data": {"object": {"id": "acct_9", "payouts_enabled": true, "charges_enabled": true}}
        }),
    );
    assert_eq!(
        h.engine.confirm_payment_webhook(&body, &signature).await.unwrap(),
        ReconcileOutcome::Applied
    );
    let account = h.store().user(seller).unwrap().payout_account.unwrap();
    assert_eq!(account.status, PayoutAccountStatus::Active);
}

// =========================================================================
// Disputes
// =========================================================================

#[tokio::test]
async fn dispute_refund_reverses_escrow_and_credits_buyer() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(200));
    let listing = list_item(h.store(), seller, dec!(100), 1);
    let result = h.buy(buyer, listing).await;

    h.engine
        .open_dispute(result.order_id, buyer, "item never arrived")
        .await
        .unwrap();
    h.engine
        .resolve_dispute(result.order_id, DisputeResolution::RefundBuyer, "seller unresponsive")
        .await
        .unwrap();

    let order = h.store().order(result.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.escrow_status, EscrowStatus::Refunded);
    assert_eq!(h.balance(buyer).0, dec!(200));
    assert_eq!(h.balance(seller), (Decimal::ZERO, Decimal::ZERO));

    let err = h.engine.confirm_delivery(result.order_id, buyer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    h.engine.verify_ledger().unwrap();
}

#[tokio::test]
async fn dispute_release_pays_seller() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(200));
    let listing = list_item(h.store(), seller, dec!(100), 1);
    let result = h.buy(buyer, listing).await;

    h.engine.mark_delivered(result.order_id, seller).await.unwrap();
    h.engine
        .open_dispute(result.order_id, seller, "buyer will not confirm")
        .await
        .unwrap();
    h.engine
        .resolve_dispute(result.order_id, DisputeResolution::ReleaseToSeller, "delivery proven")
        .await
        .unwrap();

    assert_eq!(h.store().order(result.order_id).unwrap().status, OrderStatus::Completed);
    assert_eq!(h.balance(seller), (dec!(90), Decimal::ZERO));
}

// =========================================================================
// Withdrawals
// =========================================================================

fn payout_ready_seller(h: &Harness, balance: Decimal) -> UserId {
    let seller = h.user_with_balance(balance);
    connect_payout_account(h.store(), seller, "acct_seller", PayoutAccountStatus::Active);
    seller
}

fn standard(user_id: UserId, amount: Decimal) -> WithdrawalRequest {
    WithdrawalRequest {
        user_id,
        amount,
        method: WithdrawalMethod::Standard,
        destination: String::new(),
        ip_address: Some("203.0.113.7".to_string()),
    }
}

#[tokio::test]
async fn withdrawal_must_cover_fee() {
    let h = Harness::new();
    let seller = payout_ready_seller(&h, dec!(10));

    let err = h.engine.request_withdrawal(standard(seller, dec!(0.25))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeeCalculation);
    assert_eq!(h.balance(seller).0, dec!(10));

    let paid = h.engine.request_withdrawal(standard(seller, dec!(0.26))).await.unwrap();
    assert!(paid.immediate);
    assert_eq!(paid.status, WithdrawalStatus::Completed);
    assert_eq!(paid.fee, dec!(0.25));
    assert_eq!(paid.net_amount, dec!(0.01));
    assert_eq!(h.balance(seller).0, dec!(9.74));

    let transfers = h.payouts.requests();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].amount_cents, 1);
    assert_eq!(transfers[0].destination, "acct_seller");
    assert_eq!(transfers[0].idempotency_key, transfer_idempotency_key(paid.withdrawal_id));
    assert_eq!(h.fraud.calls(), 1);
}

#[tokio::test]
async fn unverified_or_overdrawn_withdrawals_rejected() {
    let h = Harness::new();
    let pending_kyc = h.user_with_balance(Decimal::ZERO);
    let mut account = h.store().user(pending_kyc).unwrap();
    account.verification_status = VerificationStatus::Pending;
    h.store().put_user(account);
    h.store().deposit(pending_kyc, dec!(50), None).unwrap();

    let err = h.engine.request_withdrawal(standard(pending_kyc, dec!(20))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotVerified);

    let seller = payout_ready_seller(&h, dec!(5));
    let err = h.engine.request_withdrawal(standard(seller, dec!(5.01))).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);

    assert!(h.payouts.requests().is_empty());
    assert_eq!(h.balance(pending_kyc).0, dec!(50));
    assert_eq!(h.balance(seller).0, dec!(5));
}

#[tokio::test]
async fn scorer_outage_routes_to_review_then_approval_pays() {
    let h = Harness::with_fraud(MockFraudScorer::failing());
    let seller = payout_ready_seller(&h, dec!(100));

    let queued = h.engine.request_withdrawal(standard(seller, dec!(60))).await.unwrap();
    assert!(!queued.immediate);
    assert_eq!(queued.status, WithdrawalStatus::Pending);
    assert_eq!(queued.review_reason, Some(ReviewReason::ScoringUnavailable));
    assert!(h.payouts.requests().is_empty());
    assert_eq!(h.balance(seller).0, dec!(40));
    assert_eq!(h.store().pending_withdrawals().len(), 1);

    let approved = h
        .engine
        .approve_withdrawal(queued.withdrawal_id, None)
        .await
        .unwrap();
    assert_eq!(approved.status, WithdrawalStatus::Completed);
    assert_eq!(approved.transfer_reference.as_deref(), Some("tr_1"));
    assert_eq!(h.payouts.requests()[0].amount_cents, 5975);
    assert!(h.store().pending_withdrawals().is_empty());
}

#[tokio::test]
async fn rejected_crypto_withdrawal_is_refunded() {
    let h = Harness::new();
    let seller = payout_ready_seller(&h, dec!(100));

    let queued = h
        .engine
        .request_withdrawal(WithdrawalRequest {
            user_id: seller,
            amount: dec!(50),
            method: WithdrawalMethod::Bitcoin,
            destination: "bc1qexampleaddress".to_string(),
            ip_address: None,
        })
        .await
        .unwrap();
    assert_eq!(queued.review_reason, Some(ReviewReason::CryptoRail));
    // 1% + 2.00
    assert_eq!(queued.fee, dec!(2.50));
    assert_eq!(h.fraud.calls(), 0);

    let err = h
        .engine
        .approve_withdrawal(queued.withdrawal_id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let rejected = h
        .engine
        .reject_withdrawal(queued.withdrawal_id, "address failed screening")
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(h.balance(seller).0, dec!(100));
    h.engine.verify_ledger().unwrap();
}

// =========================================================================
// Wallet summary
// =========================================================================

#[tokio::test]
async fn wallet_summary_lists_newest_entries_first() {
    let h = Harness::new();
    let seller = h.user_with_balance(Decimal::ZERO);
    let buyer = h.user_with_balance(dec!(150));
    let listing = list_item(h.store(), seller, dec!(10), 3);
    h.buy(buyer, listing).await;

    let summary = h.engine.wallet_summary(buyer);
    // 10 * 3% + 0.50 = 0.80
    assert_eq!(summary.balance, dec!(139.20));
    assert_eq!(summary.recent_transactions.len(), 2);
    assert_eq!(summary.recent_transactions[0].tx_type, TransactionType::Purchase);
    assert_eq!(summary.recent_transactions[0].amount, dec!(-10.80));
    assert_eq!(summary.recent_transactions[1].tx_type, TransactionType::Deposit);
}
