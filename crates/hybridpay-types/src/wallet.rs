//! Wallet and ledger-entry types.
//!
//! Every user has an available `balance` (spendable, withdrawable) and a
//! `pending_balance` (seller earnings held in escrow until the order
//! completes). Each movement of either bucket is recorded as an immutable
//! [`WalletTransaction`] carrying before/after snapshots of that bucket.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId, WalletId};

/// A user's custodial wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    /// Available for purchases and withdrawal. Never negative.
    pub balance: Decimal,
    /// Escrowed seller earnings not yet released.
    pub pending_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a zero-balance wallet for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: WalletId::new(),
            user_id,
            balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance of one bucket.
    #[must_use]
    pub fn bucket(&self, bucket: LedgerBucket) -> Decimal {
        match bucket {
            LedgerBucket::Available => self.balance,
            LedgerBucket::Pending => self.pending_balance,
        }
    }

    /// Total balance (available + pending).
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.balance + self.pending_balance
    }
}

/// Which balance of a wallet a ledger entry moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerBucket {
    Available,
    Pending,
}

impl std::fmt::Display for LedgerBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "AVAILABLE"),
            Self::Pending => write!(f, "PENDING"),
        }
    }
}

/// Business meaning of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Funds added from outside the platform.
    Deposit,
    /// Seller earnings entering escrow.
    Sale,
    /// Buyer wallet funds spent on an order.
    Purchase,
    /// Gross amount leaving the wallet for a payout.
    Withdrawal,
    /// Funds returned to a buyer, or a rejected withdrawal returned.
    Refund,
    /// Escrow maturing from pending into available.
    EscrowRelease,
    /// Escrowed earnings reversed when an order is refunded.
    EscrowReversal,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Sale => write!(f, "SALE"),
            Self::Purchase => write!(f, "PURCHASE"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
            Self::Refund => write!(f, "REFUND"),
            Self::EscrowRelease => write!(f, "ESCROW_RELEASE"),
            Self::EscrowReversal => write!(f, "ESCROW_REVERSAL"),
        }
    }
}

/// Immutable ledger entry.
///
/// Invariant: for a given wallet and bucket, entries replayed in `sequence`
/// order chain exactly (`balance_after[n] == balance_before[n + 1]`) and the
/// last `balance_after` equals the wallet's current bucket balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    /// Store-wide creation order.
    pub sequence: u64,
    pub bucket: LedgerBucket,
    /// Signed: positive for credits, negative for debits.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub tx_type: TransactionType,
    /// Linked order number or withdrawal id.
    pub reference: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Read model returned to the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSummary {
    pub user_id: UserId,
    pub balance: Decimal,
    pub pending_balance: Decimal,
    /// Newest first.
    pub recent_transactions: Vec<WalletTransaction>,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn new_wallet_is_zero() {
        let wallet = Wallet::new(UserId::new(), Utc::now());
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(wallet.pending_balance, Decimal::ZERO);
        assert_eq!(wallet.total(), Decimal::ZERO);
    }

    #[test]
    fn bucket_accessor() {
        let mut wallet = Wallet::new(UserId::new(), Utc::now());
        wallet.balance = dec!(12.50);
        wallet.pending_balance = dec!(7.25);
        assert_eq!(wallet.bucket(LedgerBucket::Available), dec!(12.50));
        assert_eq!(wallet.bucket(LedgerBucket::Pending), dec!(7.25));
        assert_eq!(wallet.total(), dec!(19.75));
    }

    #[test]
    fn transaction_type_wire_names() {
        let json = serde_json::to_string(&TransactionType::EscrowRelease).unwrap();
        assert_eq!(json, "\"ESCROW_RELEASE\"");
        assert_eq!(TransactionType::Purchase.to_string(), "PURCHASE");
    }
}
