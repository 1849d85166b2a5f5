//! Escrow-moving order transitions.
//!
//! Each function runs inside a caller-supplied unit of work and performs
//! the order status change together with its ledger entries, timeline
//! entry and notifications, so the coordinator, reconciler and sweeper
//! share one definition of "hold", "release", "refund" and "cancel".

use hybridpay_ledger::UnitOfWork;
use hybridpay_types::{
    EscrowStatus, NotificationKind, OrderId, OrderStatus, Result, TimelineEvent, TransactionType,
};
use rust_decimal::Decimal;
use serde_json::json;

/// PENDING → ACTIVE: stamp payment, start the delivery clock, credit the
/// seller's pending balance with the order's earnings.
///
/// `payment_ref` is the external payment id when the trigger is a webhook,
/// `None` for a wallet-funded order.
pub(crate) fn hold(
    uow: &mut UnitOfWork<'_>,
    order_id: OrderId,
    payment_ref: Option<&str>,
) -> Result<()> {
    let now = uow.now();
    let order = uow.order_mut(order_id)?;
    order.activate(now)?;
    let order = order.clone();

    let seller_wallet = uow.ensure_wallet(order.seller_id);
    if order.seller_earnings > Decimal::ZERO {
        uow.credit_pending(
            seller_wallet.id,
            order.seller_earnings,
            TransactionType::Sale,
            Some(order.order_number.to_string()),
            Some(json!({ "order_id": order.id.to_string() })),
        )?;
    }

    let description = match payment_ref {
        Some(reference) => format!("Payment confirmed by processor ({reference})"),
        None => "Paid in full from wallet balance".to_string(),
    };
    uow.append_timeline(
        order.id,
        TimelineEvent::PaymentConfirmed,
        description,
        json!({
            "payment_reference": payment_ref,
            "seller_earnings": order.seller_earnings,
            "delivery_deadline": order.delivery_deadline,
        }),
    );
    uow.notify(
        order.seller_id,
        NotificationKind::PaymentReceived,
        "Payment received",
        format!(
            "Order {} is paid. Deliver before the deadline to receive {}.",
            order.order_number, order.seller_earnings
        ),
        Some(order.order_number.to_string()),
    );
    Ok(())
}

/// → COMPLETED: move held earnings from the seller's pending balance into
/// available.
pub(crate) fn complete(
    uow: &mut UnitOfWork<'_>,
    order_id: OrderId,
    event: TimelineEvent,
    description: &str,
) -> Result<()> {
    let now = uow.now();
    let order = uow.order_mut(order_id)?;
    order.transition_to(OrderStatus::Completed, now)?;
    let was_held = order.escrow_status == EscrowStatus::Held;
    if was_held {
        order.escrow_status = EscrowStatus::Released;
    }
    let order = order.clone();

    if was_held && order.seller_earnings > Decimal::ZERO {
        let seller_wallet = uow.ensure_wallet(order.seller_id);
        uow.release_pending(
            seller_wallet.id,
            order.seller_earnings,
            Some(order.order_number.to_string()),
        )?;
    }

    uow.append_timeline(
        order.id,
        event,
        description,
        json!({ "released": order.seller_earnings, "escrow_status": order.escrow_status }),
    );
    uow.notify(
        order.seller_id,
        NotificationKind::OrderCompleted,
        "Order completed",
        format!(
            "Order {} is complete. {} is now available in your wallet.",
            order.order_number, order.seller_earnings
        ),
        Some(order.order_number.to_string()),
    );
    Ok(())
}

/// DISPUTED → REFUNDED: reverse the seller's held earnings and return the
/// full amount the buyer paid to the buyer's wallet.
pub(crate) fn refund(uow: &mut UnitOfWork<'_>, order_id: OrderId, reason: &str) -> Result<()> {
    let now = uow.now();
    let order = uow.order_mut(order_id)?;
    order.transition_to(OrderStatus::Refunded, now)?;
    let was_held = order.escrow_status == EscrowStatus::Held;
    order.escrow_status = EscrowStatus::Refunded;
    let order = order.clone();
    let reference = Some(order.order_number.to_string());

    if was_held && order.seller_earnings > Decimal::ZERO {
        let seller_wallet = uow.ensure_wallet(order.seller_id);
        uow.debit_pending(
            seller_wallet.id,
            order.seller_earnings,
            TransactionType::EscrowReversal,
            reference.clone(),
            Some(json!({ "order_id": order.id.to_string() })),
        )?;
    }
    let buyer_wallet = uow.ensure_wallet(order.buyer_id);
    uow.credit(
        buyer_wallet.id,
        order.final_amount,
        TransactionType::Refund,
        reference.clone(),
        Some(json!({ "order_id": order.id.to_string(), "reason": reason })),
    )?;

    uow.append_timeline(
        order.id,
        TimelineEvent::Refunded,
        format!("Refunded {} to buyer wallet: {reason}", order.final_amount),
        json!({ "refunded": order.final_amount, "reversed": order.seller_earnings }),
    );
    for (user, message) in [
        (
            order.buyer_id,
            format!(
                "{} was refunded to your wallet for order {}.",
                order.final_amount, order.order_number
            ),
        ),
        (
            order.seller_id,
            format!("Order {} was refunded to the buyer.", order.order_number),
        ),
    ] {
        uow.notify(
            user,
            NotificationKind::OrderRefunded,
            "Order refunded",
            message,
            reference.clone(),
        );
    }
    Ok(())
}

/// PENDING → CANCELLED: return the wallet portion to the buyer and put the
/// stock back on the listing.
pub(crate) fn cancel_unpaid(
    uow: &mut UnitOfWork<'_>,
    order_id: OrderId,
    reason: &str,
) -> Result<()> {
    let now = uow.now();
    let order = uow.order_mut(order_id)?;
    order.transition_to(OrderStatus::Cancelled, now)?;
    let order = order.clone();
    let reference = Some(order.order_number.to_string());

    if order.wallet_portion > Decimal::ZERO {
        let buyer_wallet = uow.ensure_wallet(order.buyer_id);
        uow.credit(
            buyer_wallet.id,
            order.wallet_portion,
            TransactionType::Refund,
            reference.clone(),
            Some(json!({ "order_id": order.id.to_string(), "reason": reason })),
        )?;
    }

    match uow.listing_mut(order.listing_id) {
        Ok(listing) => listing.stock = listing.stock.saturating_add(order.quantity),
        Err(_) => tracing::warn!(
            order_id = %order.id,
            listing_id = %order.listing_id,
            "listing gone, stock not restored"
        ),
    }

    uow.append_timeline(
        order.id,
        TimelineEvent::Cancelled,
        format!("Order cancelled: {reason}"),
        json!({ "refunded_wallet_portion": order.wallet_portion }),
    );
    uow.notify(
        order.buyer_id,
        NotificationKind::OrderCancelled,
        "Order cancelled",
        format!("Order {} was cancelled: {reason}", order.order_number),
        reference,
    );
    Ok(())
}
