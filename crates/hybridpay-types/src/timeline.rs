//! Order audit trail and user notifications.
//!
//! Every significant action on an order (created, paid, delivered,
//! disputed, refunded) appends an [`OrderTimelineEntry`]. Entries form an
//! append-only trail and are never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NotificationId, OrderId, TimelineEntryId, UserId};

/// What happened to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineEvent {
    /// Order row created, with the wallet/external split.
    OrderCreated,
    /// External payment intent issued.
    PaymentIntentCreated,
    /// External processor confirmed payment.
    PaymentConfirmed,
    /// Seller marked the order delivered.
    Delivered,
    /// Buyer confirmed, or the confirmation window elapsed.
    Completed,
    DisputeOpened,
    /// Dispute resolved for the seller; escrow released.
    DisputeResolved,
    Refunded,
    Cancelled,
}

impl std::fmt::Display for TimelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderCreated => write!(f, "ORDER_CREATED"),
            Self::PaymentIntentCreated => write!(f, "PAYMENT_INTENT_CREATED"),
            Self::PaymentConfirmed => write!(f, "PAYMENT_CONFIRMED"),
            Self::Delivered => write!(f, "DELIVERED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::DisputeOpened => write!(f, "DISPUTE_OPENED"),
            Self::DisputeResolved => write!(f, "DISPUTE_RESOLVED"),
            Self::Refunded => write!(f, "REFUNDED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One entry in an order's append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTimelineEntry {
    pub id: TimelineEntryId,
    pub order_id: OrderId,
    pub event: TimelineEvent,
    pub description: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl OrderTimelineEntry {
    #[must_use]
    pub fn new(
        order_id: OrderId,
        event: TimelineEvent,
        description: impl Into<String>,
        metadata: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TimelineEntryId::new(),
            order_id,
            event,
            description: description.into(),
            metadata,
            created_at: now,
        }
    }
}

/// Kind of in-app notification. Delivery (email, push) is out of core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    NewOrder,
    PaymentReceived,
    OrderDelivered,
    OrderCompleted,
    OrderDisputed,
    OrderRefunded,
    OrderCancelled,
    WithdrawalCompleted,
    WithdrawalUnderReview,
    WithdrawalRejected,
}

/// Notification record created alongside money movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Linked order number or withdrawal id.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            reference,
            created_at: now,
        }
    }
}
