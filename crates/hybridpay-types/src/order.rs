//! Order types and the order state machine.
//!
//! ```text
//!            ┌─────────┐ payment confirmed ┌────────┐ delivered ┌───────────┐ confirmed ┌───────────┐
//!  create ──▶│ PENDING ├──────────────────▶│ ACTIVE ├──────────▶│ DELIVERED ├──────────▶│ COMPLETED │
//!            └────┬────┘                   └───┬────┘           └─────┬─────┘           └───────────┘
//!                 │ expired/cancelled          │ dispute              │ dispute               ▲
//!                 ▼                            ▼                      ▼                       │
//!           ┌───────────┐                ┌──────────┐◀────────────────┘                       │
//!           │ CANCELLED │                │ DISPUTED ├─────────────────────────────────────────┘
//!           └───────────┘                └────┬─────┘
//!                                             ▼
//!                                        ┌──────────┐
//!                                        │ REFUNDED │
//!                                        └──────────┘
//! ```
//!
//! Wallet-funded orders are created directly in ACTIVE.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{HybridPayError, ListingId, OrderId, OrderNumber, Result, UserId};

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting the external portion of the payment.
    Pending,
    /// Fully paid, escrow held, delivery clock running.
    Active,
    /// Seller marked delivered, awaiting buyer confirmation.
    Delivered,
    /// Buyer confirmed (or auto-confirmed). Escrow released.
    Completed,
    /// Buyer or seller raised an issue.
    Disputed,
    /// Dispute resolved in the buyer's favour.
    Refunded,
    /// Payment never completed, or admin-forced.
    Cancelled,
}

impl OrderStatus {
    /// Can an order in this state move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Delivered | Self::Disputed)
                | (Self::Delivered, Self::Completed | Self::Disputed)
                | (Self::Disputed, Self::Completed | Self::Refunded)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Cancelled)
    }

    /// Whether the order has been fully paid at some point.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Pending | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// State of the seller earnings held for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    /// Nothing held yet (order unpaid).
    None,
    /// Earnings credited to the seller's pending balance.
    Held,
    /// Earnings moved to the seller's available balance.
    Released,
    /// Earnings reversed; buyer refunded.
    Refunded,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Held => write!(f, "HELD"),
            Self::Released => write!(f, "RELEASED"),
            Self::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// One purchase of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// `unit_price * quantity`.
    pub subtotal: Decimal,
    /// Membership discount applied to the subtotal.
    pub discount: Decimal,
    /// Buyer service fee kept by the platform.
    pub platform_fee: Decimal,
    /// Commission withheld from the seller.
    pub seller_commission: Decimal,
    /// Credited to the seller's pending balance on activation.
    pub seller_earnings: Decimal,
    /// Total the buyer pays: discounted subtotal + service fee.
    pub final_amount: Decimal,
    /// Portion paid from the buyer's wallet at creation.
    pub wallet_portion: Decimal,
    /// Portion charged through the external processor.
    pub external_portion: Decimal,
    pub status: OrderStatus,
    pub escrow_status: EscrowStatus,
    /// External payment intent id, once created.
    pub payment_reference: Option<String>,
    /// Listing delivery window captured at purchase time.
    pub delivery_time_hours: u32,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivery_deadline: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Move to `target`, enforcing the state machine.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the move is not allowed.
    pub fn transition_to(&mut self, target: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(HybridPayError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = now;
        match target {
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Completed => self.completed_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        Ok(())
    }

    /// Enter ACTIVE: stamp `paid_at`, start the delivery clock, mark escrow held.
    ///
    /// Used both for wallet-funded creation (from a fresh PENDING draft)
    /// and for webhook-confirmed payment.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the order is PENDING.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(OrderStatus::Active, now)?;
        self.paid_at = Some(now);
        self.delivery_deadline = Some(now + Duration::hours(i64::from(self.delivery_time_hours)));
        self.escrow_status = EscrowStatus::Held;
        Ok(())
    }

    /// Whether `user_id` is the buyer or the seller.
    #[must_use]
    pub fn is_party(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

/// Catalog listing, as far as the settlement core needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub title: String,
    pub unit_price: Decimal,
    pub stock: u32,
    pub delivery_time_hours: u32,
    pub active: bool,
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Listing {
    pub fn dummy(seller_id: UserId, unit_price: Decimal, stock: u32) -> Self {
        Self {
            id: ListingId::new(),
            seller_id,
            title: "Digital item".to_string(),
            unit_price,
            stock,
            delivery_time_hours: 24,
            active: true,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(buyer_id: UserId, seller_id: UserId, final_amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(now),
            buyer_id,
            seller_id,
            listing_id: ListingId::new(),
            quantity: 1,
            unit_price: final_amount,
            subtotal: final_amount,
            discount: Decimal::ZERO,
            platform_fee: Decimal::ZERO,
            seller_commission: Decimal::ZERO,
            seller_earnings: final_amount,
            final_amount,
            wallet_portion: Decimal::ZERO,
            external_portion: final_amount,
            status: OrderStatus::Pending,
            escrow_status: EscrowStatus::None,
            payment_reference: None,
            delivery_time_hours: 24,
            paid_at: None,
            delivery_deadline: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
