//! Fraud-screening types for the withdrawal gate.
//!
//! The gate sends [`BehaviorSignals`] to the external scoring service and
//! routes anything other than [`RiskLevel::Low`] to manual review.
//!
//! ```text
//! Withdrawal request
//!   → manual switch on / crypto rail?  → PENDING
//!   → FraudScorer.analyze_behavior()
//!       → LOW                          → automatic payout
//!       → MEDIUM | HIGH | CRITICAL     → PENDING
//!       → error / timeout              → PENDING (fail-safe)
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Risk tier returned by the scoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Only the lowest tier qualifies for automatic payout.
    #[must_use]
    pub fn allows_automatic_payout(&self) -> bool {
        *self == Self::Low
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Marketplace history summarised for the scorer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorHistory {
    pub orders_as_buyer: u32,
    pub orders_as_seller: u32,
    pub completed_sales: u32,
    pub disputes: u32,
    pub previous_withdrawals: u32,
    pub reputation: i32,
}

/// Request body for `analyzeBehavior`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorSignals {
    pub user_id: UserId,
    pub ip_address: Option<String>,
    pub amount: Decimal,
    pub user_age_days: i64,
    pub history: BehaviorHistory,
}

/// Response body for `analyzeBehavior`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// Free-form reasons reported by the scorer, for the review queue.
    #[serde(default)]
    pub reasons: Vec<String>,
}
