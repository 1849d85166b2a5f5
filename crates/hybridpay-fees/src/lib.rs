//! # hybridpay-fees
//!
//! **Pure fee policy for HybridPay.**
//!
//! Every function here is side-effect free and parameterized by an injected
//! [`FeeRates`](hybridpay_types::FeeRates) snapshot:
//!
//! - **Order totals**: discount → discounted subtotal → service fee → total
//! - **Seller split**: commission withheld and earnings credited to escrow
//! - **Withdrawals**: per-rail percent + flat fee and the net payout
//!
//! Each computed field is rounded to cents (half-up) independently and in a
//! fixed order, so the same inputs always reproduce the same cents.

pub mod commission;
pub mod order_total;
pub mod withdrawal_fee;

pub use commission::{SellerSplit, compute_seller_earnings};
pub use order_total::{OrderTotal, compute_order_total};
pub use withdrawal_fee::{WithdrawalBreakdown, compute_withdrawal_breakdown};
