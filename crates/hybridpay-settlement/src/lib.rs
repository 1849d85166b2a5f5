//! # hybridpay-settlement
//!
//! **Money movement for HybridPay**: hybrid wallet + card checkout, escrow,
//! webhook reconciliation and gated withdrawals.
//!
//! ## Components
//!
//! 1. **SettlementCoordinator**: splits an order between the buyer's wallet
//!    and an external payment intent, debits the wallet atomically with the
//!    order insert, and drives the order lifecycle hooks
//! 2. **WebhookReconciler**: verifies signed processor events and applies
//!    each one at most once
//! 3. **WithdrawalGate**: identity, balance, fee and fraud screening before
//!    any payout leaves the platform
//! 4. **HybridPayEngine**: the three above wired over one `LedgerStore`
//!
//! ## Order Flow
//!
//! ```text
//! create_order ──► wallet covers all ──► ACTIVE (escrow HELD)
//!      │
//!      └─► external remainder ──► PENDING + payment intent
//!                                     │
//!            payment_intent.succeeded ┘──► ACTIVE (escrow HELD)
//!
//! ACTIVE ─► DELIVERED ─► COMPLETED (escrow RELEASED, seller paid)
//!    └──────────┴──────► DISPUTED ─► COMPLETED | REFUNDED
//! ```
//!
//! Collaborators (payment processor, payout provider, fraud scorer, fee
//! source) sit behind async traits in [`collaborators`]. In-memory
//! implementations live in `testing`, behind the `test-helpers` feature.

pub mod collaborators;
pub mod coordinator;
pub mod engine;
mod escrow;
pub mod fee_config;
pub mod idempotency;
pub mod lifecycle;
pub mod reconciler;
pub mod stripe;
pub mod sweeper;
pub mod telemetry;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod webhook;
pub mod withdrawal_gate;

pub use collaborators::{
    FeeConfigSource, FraudScorer, PaymentIntent, PaymentIntentRequest, PaymentProcessor,
    PayoutProvider, Transfer, TransferRequest,
};
pub use coordinator::{CreateOrderRequest, OrderSettlementResult, SettlementCoordinator};
pub use engine::{Collaborators, HybridPayEngine};
pub use fee_config::FeeConfig;
pub use lifecycle::DisputeResolution;
pub use reconciler::{ReconcileOutcome, WebhookReconciler};
pub use stripe::StripeGateway;
pub use sweeper::{SweepReport, run_sweep, spawn_sweeper};
pub use telemetry::{LogFormat, init_tracing};
pub use withdrawal_gate::{WithdrawalGate, WithdrawalRequest, WithdrawalResult};
