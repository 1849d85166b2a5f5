//! Payout request types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{UserId, WithdrawalId};

/// Payout rail. Each rail has its own percent + flat fee pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalMethod {
    /// Transfer to the user's connected payout account.
    Standard,
    Bitcoin,
    Ethereum,
    Litecoin,
    Usdt,
}

impl WithdrawalMethod {
    /// Crypto rails are always routed to manual review.
    #[must_use]
    pub fn is_crypto(&self) -> bool {
        !matches!(self, Self::Standard)
    }
}

impl std::fmt::Display for WithdrawalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "STANDARD"),
            Self::Bitcoin => write!(f, "BITCOIN"),
            Self::Ethereum => write!(f, "ETHEREUM"),
            Self::Litecoin => write!(f, "LITECOIN"),
            Self::Usdt => write!(f, "USDT"),
        }
    }
}

/// Lifecycle of a payout request.
///
/// `Pending → Completed` (manual approval or automated payout confirmation)
/// or `Pending → Rejected` (manual review). Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Why a withdrawal was routed to manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewReason {
    ManualPaymentsEnabled,
    CryptoRail,
    ElevatedRisk,
    ScoringUnavailable,
}

impl std::fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManualPaymentsEnabled => write!(f, "MANUAL_PAYMENTS_ENABLED"),
            Self::CryptoRail => write!(f, "CRYPTO_RAIL"),
            Self::ElevatedRisk => write!(f, "ELEVATED_RISK"),
            Self::ScoringUnavailable => write!(f, "SCORING_UNAVAILABLE"),
        }
    }
}

/// A payout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    /// Gross amount debited from the wallet.
    pub amount: Decimal,
    pub fee: Decimal,
    /// Amount actually sent: `amount - fee`.
    pub net_amount: Decimal,
    pub method: WithdrawalMethod,
    /// Payout account id or crypto address.
    pub destination: String,
    pub status: WithdrawalStatus,
    pub review_reason: Option<ReviewReason>,
    /// External transfer id once paid out.
    pub transfer_reference: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Withdrawal {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == WithdrawalStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_rails() {
        assert!(!WithdrawalMethod::Standard.is_crypto());
        assert!(WithdrawalMethod::Bitcoin.is_crypto());
        assert!(WithdrawalMethod::Usdt.is_crypto());
    }

    #[test]
    fn method_wire_names() {
        let json = serde_json::to_string(&WithdrawalMethod::Ethereum).unwrap();
        assert_eq!(json, "\"ETHEREUM\"");
        let back: WithdrawalMethod = serde_json::from_str("\"LITECOIN\"").unwrap();
        assert_eq!(back, WithdrawalMethod::Litecoin);
    }
}
