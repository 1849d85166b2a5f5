//! Settlement Coordinator: order creation with a wallet/external payment split.
//!
//! ```text
//! create_order
//!   ├─ buyer wallet lock
//!   ├─ one unit of work
//!   │    ├─ validate listing, stock, buyer ≠ seller
//!   │    ├─ fees + seller split
//!   │    ├─ wallet portion = min(balance, total)
//!   │    ├─ debit wallet (PURCHASE), insert order, decrement stock
//!   │    ├─ external portion == 0 → ACTIVE + escrow hold
//!   │    └─ timeline + seller notification
//!   └─ external portion > 0 → payment intent (outside the transaction)
//! ```
//!
//! A payment-intent failure leaves the order PENDING with no reference;
//! [`SettlementCoordinator::retry_payment_intent`] re-issues it under the
//! same idempotency key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hybridpay_fees::{compute_order_total, compute_seller_earnings};
use hybridpay_ledger::{LedgerStore, UnitOfWork};
use hybridpay_types::constants::{MAX_ORDER_QUANTITY, ORDER_NUMBER_ATTEMPTS};
use hybridpay_types::money::{round_cents, to_cents};
use hybridpay_types::{
    EngineConfig, EscrowStatus, FeeRates, HybridPayError, ListingId, NotificationKind, Order,
    OrderId, OrderNumber, OrderStatus, Result, TimelineEvent, TransactionType, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::collaborators::{
    PaymentIntent, PaymentIntentRequest, PaymentProcessor, call_with_timeout,
};
use crate::escrow;
use crate::fee_config::FeeConfig;

/// Purchase request from the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub buyer_id: UserId,
    pub listing_id: ListingId,
    pub quantity: u32,
    /// Client-asserted. Honoured only if the account has the entitlement.
    #[serde(default)]
    pub membership_discount_requested: bool,
}

/// Outcome of a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettlementResult {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub total: Decimal,
    pub wallet_portion_used: Decimal,
    pub external_portion: Decimal,
    /// Present when an external payment must be completed by the client.
    pub client_token: Option<String>,
}

impl OrderSettlementResult {
    fn from_order(order: &Order, client_token: Option<String>) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            total: order.final_amount,
            wallet_portion_used: order.wallet_portion,
            external_portion: order.external_portion,
            client_token,
        }
    }
}

/// Orchestrates fee calculation, wallet debit, order creation and the
/// external payment intent.
///
/// Lifecycle hooks after payment live in [`crate::lifecycle`].
pub struct SettlementCoordinator {
    pub(crate) store: Arc<LedgerStore>,
    pub(crate) fees: Arc<FeeConfig>,
    pub(crate) payments: Arc<dyn PaymentProcessor>,
    pub(crate) config: Arc<EngineConfig>,
}

impl SettlementCoordinator {
    pub fn new(
        store: Arc<LedgerStore>,
        fees: Arc<FeeConfig>,
        payments: Arc<dyn PaymentProcessor>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            fees,
            payments,
            config,
        }
    }

    /// Create an order, paying as much as possible from the buyer's wallet.
    ///
    /// # Errors
    /// - `Validation` / `ListingNotFound` / `InsufficientStock` / `UserNotFound`
    ///   before anything is written.
    /// - `ConcurrencyConflict` if the buyer's wallet is busy.
    /// - `PaymentIntentFailed` if the order was committed PENDING but the
    ///   processor call failed; retry with [`Self::retry_payment_intent`].
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<OrderSettlementResult> {
        if request.quantity == 0 || request.quantity > MAX_ORDER_QUANTITY {
            return Err(HybridPayError::Validation {
                reason: format!(
                    "quantity must be between 1 and {MAX_ORDER_QUANTITY}, got {}",
                    request.quantity
                ),
            });
        }

        let rates = self.fees.snapshot();
        let order = {
            let _wallet_guard = self.store.wallet_locks().acquire(request.buyer_id).await?;
            self.store
                .transaction(|uow| settle_in_transaction(uow, &request, &rates))?
        };

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            buyer_id = %order.buyer_id,
            seller_id = %order.seller_id,
            total = %order.final_amount,
            wallet_portion = %order.wallet_portion,
            external_portion = %order.external_portion,
            status = %order.status,
            "order created"
        );

        if order.external_portion <= Decimal::ZERO {
            return Ok(OrderSettlementResult::from_order(&order, None));
        }

        // Cancellation takes this lock too and waits for the reference.
        let _order_guard = self.store.order_locks().acquire(order.id).await?;
        let order = self.store.order(order.id).unwrap_or(order);
        if order.status != OrderStatus::Pending {
            tracing::warn!(
                order_id = %order.id,
                status = %order.status,
                "order left PENDING before its payment intent was issued"
            );
            return Ok(OrderSettlementResult::from_order(&order, None));
        }

        let intent = self.issue_payment_intent(&order).await?;
        let order = self.store.order(order.id).unwrap_or(order);
        Ok(OrderSettlementResult::from_order(&order, Some(intent.client_secret)))
    }

    /// Re-issue the payment intent of a PENDING order.
    ///
    /// The idempotency key is derived from the order id, so a processor that
    /// already created the intent returns it again instead of charging twice.
    ///
    /// # Errors
    /// `OrderNotFound`, `Validation` if `buyer_id` is not the buyer or the
    /// order is no longer awaiting payment, `PaymentIntentFailed` on
    /// processor failure.
    pub async fn retry_payment_intent(
        &self,
        order_id: OrderId,
        buyer_id: UserId,
    ) -> Result<OrderSettlementResult> {
        let _order_guard = self.store.order_locks().acquire(order_id).await?;
        let order = self
            .store
            .order(order_id)
            .ok_or(HybridPayError::OrderNotFound(order_id))?;
        if order.buyer_id != buyer_id {
            return Err(HybridPayError::Validation {
                reason: format!("order {} does not belong to {buyer_id}", order.order_number),
            });
        }
        if order.status != OrderStatus::Pending || order.external_portion <= Decimal::ZERO {
            return Err(HybridPayError::Validation {
                reason: format!(
                    "order {} is {}, not awaiting external payment",
                    order.order_number, order.status
                ),
            });
        }

        let intent = self.issue_payment_intent(&order).await?;
        tracing::info!(%order_id, payment_ref = %intent.id, "payment intent re-issued");
        let order = self.store.order(order_id).unwrap_or(order);
        Ok(OrderSettlementResult::from_order(&order, Some(intent.client_secret)))
    }

    async fn issue_payment_intent(&self, order: &Order) -> Result<PaymentIntent> {
        let failed = |reason: String| HybridPayError::PaymentIntentFailed {
            order_id: order.id,
            reason,
        };

        let amount_cents = to_cents(order.external_portion).map_err(|e| failed(e.to_string()))?;
        let request = PaymentIntentRequest {
            amount_cents,
            currency: self.config.currency.clone(),
            idempotency_key: payment_idempotency_key(order.id),
            metadata: BTreeMap::from([
                ("order_id".to_string(), order.id.to_string()),
                ("order_number".to_string(), order.order_number.to_string()),
                ("buyer_id".to_string(), order.buyer_id.to_string()),
            ]),
        };

        let timeout = Duration::from_millis(self.config.collaborator_timeout_ms);
        let intent = match call_with_timeout(
            "payment-processor",
            timeout,
            self.payments.create_payment_intent(request),
        )
        .await
        {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    buyer_id = %order.buyer_id,
                    amount = %order.external_portion,
                    error = %e,
                    "payment intent creation failed, order left pending"
                );
                return Err(failed(e.to_string()));
            }
        };

        self.store.transaction(|uow| {
            let order = uow.order_mut(order.id)?;
            if order.status != OrderStatus::Pending {
                return Err(HybridPayError::InvalidTransition {
                    from: order.status,
                    to: OrderStatus::Pending,
                });
            }
            order.payment_reference = Some(intent.id.clone());
            let order_id = order.id;
            uow.append_timeline(
                order_id,
                TimelineEvent::PaymentIntentCreated,
                format!("External payment intent {} issued", intent.id),
                json!({ "payment_reference": intent.id, "amount_cents": amount_cents }),
            );
            Ok(())
        })?;
        Ok(intent)
    }
}

/// Idempotency key for the payment intent of `order_id`.
#[must_use]
pub fn payment_idempotency_key(order_id: OrderId) -> String {
    format!("payment-{}", order_id.0)
}

fn settle_in_transaction(
    uow: &mut UnitOfWork<'_>,
    request: &CreateOrderRequest,
    rates: &FeeRates,
) -> Result<Order> {
    let now = uow.now();
    let listing = uow
        .listing(request.listing_id)
        .cloned()
        .ok_or(HybridPayError::ListingNotFound(request.listing_id))?;
    if !listing.active {
        return Err(HybridPayError::Validation {
            reason: format!("listing {} is not available", listing.id),
        });
    }
    if listing.seller_id == request.buyer_id {
        return Err(HybridPayError::Validation {
            reason: "cannot purchase your own listing".to_string(),
        });
    }
    if listing.stock < request.quantity {
        return Err(HybridPayError::InsufficientStock {
            requested: request.quantity,
            available: listing.stock,
        });
    }

    let buyer = uow.require_user(request.buyer_id)?;
    let discount_eligible =
        request.membership_discount_requested && buyer.membership_discount_active;

    let subtotal = round_cents(listing.unit_price * Decimal::from(request.quantity));
    let totals = compute_order_total(subtotal, discount_eligible, rates);
    let split = compute_seller_earnings(subtotal, rates);

    let balance = uow
        .wallet_for_user(request.buyer_id)
        .map_or(Decimal::ZERO, |w| w.balance);
    let wallet_portion = round_cents(balance.min(totals.total));
    let external_portion = round_cents(totals.total - wallet_portion);

    let order_number = unique_order_number(uow)?;
    let order = Order {
        id: OrderId::new(),
        order_number: order_number.clone(),
        buyer_id: request.buyer_id,
        seller_id: listing.seller_id,
        listing_id: listing.id,
        quantity: request.quantity,
        unit_price: listing.unit_price,
        subtotal,
        discount: totals.discount,
        platform_fee: totals.service_fee,
        seller_commission: split.commission,
        seller_earnings: split.seller_earnings,
        final_amount: totals.total,
        wallet_portion,
        external_portion,
        status: OrderStatus::Pending,
        escrow_status: EscrowStatus::None,
        payment_reference: None,
        delivery_time_hours: listing.delivery_time_hours,
        paid_at: None,
        delivery_deadline: None,
        delivered_at: None,
        completed_at: None,
        cancelled_at: None,
        created_at: now,
        updated_at: now,
    };
    let order_id = order.id;
    uow.insert_order(order)?;

    let stock = &mut uow.listing_mut(listing.id)?.stock;
    *stock -= request.quantity;

    if wallet_portion > Decimal::ZERO {
        let wallet = uow.ensure_wallet(request.buyer_id);
        uow.debit(
            wallet.id,
            wallet_portion,
            TransactionType::Purchase,
            Some(order_number.to_string()),
            Some(json!({ "order_id": order_id.to_string(), "listing_id": listing.id.to_string() })),
        )?;
    }

    let split_description = if external_portion > Decimal::ZERO {
        format!("Order created: {wallet_portion} from wallet, {external_portion} by card")
    } else {
        format!("Order created: {wallet_portion} paid from wallet")
    };
    uow.append_timeline(
        order_id,
        TimelineEvent::OrderCreated,
        split_description,
        json!({
            "subtotal": subtotal,
            "discount": totals.discount,
            "service_fee": totals.service_fee,
            "total": totals.total,
            "wallet_portion": wallet_portion,
            "external_portion": external_portion,
        }),
    );

    if external_portion <= Decimal::ZERO {
        escrow::hold(uow, order_id, None)?;
    }

    uow.notify(
        listing.seller_id,
        NotificationKind::NewOrder,
        "New order",
        format!("{} ordered {} x {}.", order_number, request.quantity, listing.title),
        Some(order_number.to_string()),
    );

    uow.require_order(order_id).cloned()
}

fn unique_order_number(uow: &UnitOfWork<'_>) -> Result<OrderNumber> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let candidate = OrderNumber::generate(uow.now());
        if !uow.order_number_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(HybridPayError::Internal(format!(
        "no free order number after {ORDER_NUMBER_ATTEMPTS} attempts"
    )))
}
