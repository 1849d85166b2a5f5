//! # hybridpay-types
//!
//! Shared types, errors, and configuration for the **HybridPay** settlement
//! engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`UserId`], [`WalletId`], [`OrderId`], [`OrderNumber`], [`ListingId`], [`WithdrawalId`], [`TransactionId`]
//! - **Money**: [`money::round_cents`] and cent conversion helpers
//! - **Wallet model**: [`Wallet`], [`WalletTransaction`], [`LedgerBucket`], [`TransactionType`], [`WalletSummary`]
//! - **Order model**: [`Order`], [`OrderStatus`], [`EscrowStatus`], [`Listing`]
//! - **Audit trail**: [`OrderTimelineEntry`], [`TimelineEvent`], [`Notification`]
//! - **Payouts**: [`Withdrawal`], [`WithdrawalMethod`], [`WithdrawalStatus`]
//! - **Accounts**: [`UserAccount`], [`VerificationStatus`], [`PayoutAccountStatus`]
//! - **Fraud screening**: [`RiskLevel`], [`BehaviorSignals`], [`RiskAssessment`]
//! - **Configuration**: [`FeeRates`], [`WithdrawalFeeSchedule`], [`EngineConfig`]
//! - **Errors**: [`HybridPayError`] with `HP_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod money;
pub mod order;
pub mod risk;
pub mod timeline;
pub mod user;
pub mod wallet;
pub mod withdrawal;

// Re-export all primary types at crate root for ergonomic imports:
//   use hybridpay_types::{Order, OrderStatus, Wallet, Withdrawal, ...};

pub use config::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use risk::*;
pub use timeline::*;
pub use user::*;
pub use wallet::*;
pub use withdrawal::*;

// Constants and money helpers are accessed via their module paths
// (`hybridpay_types::constants::FOO`, `hybridpay_types::money::round_cents`).
