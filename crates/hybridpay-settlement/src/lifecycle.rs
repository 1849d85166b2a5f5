//! Order lifecycle hooks after creation: delivery, confirmation, disputes,
//! cancellation, and the time-based sweeps.
//!
//! Every hook serializes on the order's keyed lock, then runs one unit of
//! work. The state machine in [`hybridpay_types::Order::transition_to`]
//! rejects anything out of order.

use chrono::{DateTime, Duration, Utc};
use hybridpay_types::{
    HybridPayError, NotificationKind, OrderId, OrderStatus, Result, TimelineEvent, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::coordinator::SettlementCoordinator;
use crate::escrow;

/// Outcome of an externally adjudicated dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeResolution {
    /// Seller keeps the sale; escrow is released.
    ReleaseToSeller,
    /// Buyer is refunded in full to their wallet.
    RefundBuyer,
}

impl SettlementCoordinator {
    /// ACTIVE → DELIVERED, by the seller.
    ///
    /// # Errors
    /// `Validation` if `seller_id` is not the seller, `InvalidTransition`
    /// unless the order is ACTIVE.
    pub async fn mark_delivered(&self, order_id: OrderId, seller_id: UserId) -> Result<()> {
        let _guard = self.store.order_locks().acquire(order_id).await?;
        self.store.transaction(|uow| {
            let now = uow.now();
            let order = uow.order_mut(order_id)?;
            if order.seller_id != seller_id {
                return Err(not_party(order_id, seller_id, "seller"));
            }
            order.transition_to(OrderStatus::Delivered, now)?;
            let order = order.clone();
            uow.append_timeline(
                order_id,
                TimelineEvent::Delivered,
                "Seller marked the order delivered",
                json!({ "delivered_at": order.delivered_at }),
            );
            uow.notify(
                order.buyer_id,
                NotificationKind::OrderDelivered,
                "Order delivered",
                format!("Order {} was delivered. Please confirm receipt.", order.order_number),
                Some(order.order_number.to_string()),
            );
            Ok(())
        })?;
        tracing::info!(%order_id, %seller_id, "order delivered");
        Ok(())
    }

    /// DELIVERED → COMPLETED, by the buyer. Releases escrow to the seller.
    ///
    /// # Errors
    /// `Validation` if `buyer_id` is not the buyer, `InvalidTransition`
    /// unless the order is DELIVERED.
    pub async fn confirm_delivery(&self, order_id: OrderId, buyer_id: UserId) -> Result<()> {
        let _guard = self.store.order_locks().acquire(order_id).await?;
        self.store.transaction(|uow| {
            let order = uow.require_order(order_id)?;
            if order.buyer_id != buyer_id {
                return Err(not_party(order_id, buyer_id, "buyer"));
            }
            if order.status != OrderStatus::Delivered {
                return Err(HybridPayError::InvalidTransition {
                    from: order.status,
                    to: OrderStatus::Completed,
                });
            }
            escrow::complete(uow, order_id, TimelineEvent::Completed, "Buyer confirmed delivery")
        })?;
        tracing::info!(%order_id, %buyer_id, "delivery confirmed, escrow released");
        Ok(())
    }

    /// ACTIVE | DELIVERED → DISPUTED, by either party.
    ///
    /// # Errors
    /// `Validation` if `user_id` is neither buyer nor seller,
    /// `InvalidTransition` from any other status.
    pub async fn open_dispute(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: &str,
    ) -> Result<()> {
        let _guard = self.store.order_locks().acquire(order_id).await?;
        self.store.transaction(|uow| {
            let now = uow.now();
            let order = uow.order_mut(order_id)?;
            if !order.is_party(user_id) {
                return Err(not_party(order_id, user_id, "buyer or seller"));
            }
            order.transition_to(OrderStatus::Disputed, now)?;
            let order = order.clone();
            uow.append_timeline(
                order_id,
                TimelineEvent::DisputeOpened,
                format!("Dispute opened: {reason}"),
                json!({ "opened_by": user_id.to_string(), "reason": reason }),
            );
            let counterparty = if user_id == order.buyer_id {
                order.seller_id
            } else {
                order.buyer_id
            };
            uow.notify(
                counterparty,
                NotificationKind::OrderDisputed,
                "Order disputed",
                format!("A dispute was opened on order {}: {reason}", order.order_number),
                Some(order.order_number.to_string()),
            );
            Ok(())
        })?;
        tracing::warn!(%order_id, %user_id, reason, "dispute opened");
        Ok(())
    }

    /// DISPUTED → COMPLETED or REFUNDED, from the dispute-resolution process.
    ///
    /// # Errors
    /// `InvalidTransition` unless the order is DISPUTED.
    pub async fn resolve_dispute(
        &self,
        order_id: OrderId,
        resolution: DisputeResolution,
        note: &str,
    ) -> Result<()> {
        let _guard = self.store.order_locks().acquire(order_id).await?;
        self.store.transaction(|uow| {
            let status = uow.require_order(order_id)?.status;
            if status != OrderStatus::Disputed {
                let to = match resolution {
                    DisputeResolution::ReleaseToSeller => OrderStatus::Completed,
                    DisputeResolution::RefundBuyer => OrderStatus::Refunded,
                };
                return Err(HybridPayError::InvalidTransition { from: status, to });
            }
            match resolution {
                DisputeResolution::ReleaseToSeller => escrow::complete(
                    uow,
                    order_id,
                    TimelineEvent::DisputeResolved,
                    &format!("Dispute resolved for the seller: {note}"),
                ),
                DisputeResolution::RefundBuyer => escrow::refund(uow, order_id, note),
            }
        })?;
        tracing::info!(%order_id, ?resolution, "dispute resolved");
        Ok(())
    }

    /// PENDING → CANCELLED. Returns the wallet portion and restores stock.
    ///
    /// # Errors
    /// `InvalidTransition` unless the order is PENDING.
    pub async fn cancel_pending_order(&self, order_id: OrderId, reason: &str) -> Result<()> {
        let _guard = self.store.order_locks().acquire(order_id).await?;
        self.store
            .transaction(|uow| escrow::cancel_unpaid(uow, order_id, reason))?;
        tracing::info!(%order_id, reason, "pending order cancelled");
        Ok(())
    }

    /// Cancel PENDING orders created more than the configured TTL before
    /// `now`. Returns how many were cancelled.
    ///
    /// Orders that fail (busy lock, concurrent payment) are logged and left
    /// for the next sweep.
    pub async fn expire_unpaid_orders(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.pending_order_ttl_minutes;
        let cutoff = now - Duration::minutes(ttl);
        let reason = format!("payment not completed within {ttl} minutes");

        let mut expired = 0;
        for order_id in self.store.unpaid_orders_created_before(cutoff) {
            let outcome = async {
                let _guard = self.store.order_locks().acquire(order_id).await?;
                self.store.transaction_at(now, |uow| {
                    if uow.require_order(order_id)?.status != OrderStatus::Pending {
                        return Ok(false);
                    }
                    escrow::cancel_unpaid(uow, order_id, &reason)?;
                    Ok(true)
                })
            }
            .await;
            match outcome {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(%order_id, error = %e, "failed to expire unpaid order"),
            }
        }
        if expired > 0 {
            tracing::info!(expired, "unpaid orders expired");
        }
        expired
    }

    /// Complete DELIVERED orders whose confirmation window has elapsed.
    /// Returns how many were completed.
    pub async fn auto_confirm_delivered(&self, now: DateTime<Utc>) -> usize {
        let hours = self.config.auto_confirm_after_hours;
        let cutoff = now - Duration::hours(hours);
        let description = format!("Auto-confirmed {hours} hours after delivery");

        let mut confirmed = 0;
        for order_id in self.store.delivered_orders_before(cutoff) {
            let outcome = async {
                let _guard = self.store.order_locks().acquire(order_id).await?;
                self.store.transaction_at(now, |uow| {
                    if uow.require_order(order_id)?.status != OrderStatus::Delivered {
                        return Ok(false);
                    }
                    escrow::complete(uow, order_id, TimelineEvent::Completed, &description)?;
                    Ok(true)
                })
            }
            .await;
            match outcome {
                Ok(true) => confirmed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(%order_id, error = %e, "failed to auto-confirm order"),
            }
        }
        if confirmed > 0 {
            tracing::info!(confirmed, "delivered orders auto-confirmed");
        }
        confirmed
    }
}

fn not_party(order_id: OrderId, user_id: UserId, role: &str) -> HybridPayError {
    HybridPayError::Validation {
        reason: format!("{user_id} is not the {role} of order {order_id}"),
    }
}
