//! Error types for the HybridPay settlement engine.
//!
//! All errors use the `HP_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation / lookup errors
//! - 2xx: Balance and ledger errors
//! - 3xx: Identity and fee errors
//! - 4xx: External collaborator errors
//! - 5xx: Concurrency errors
//! - 6xx: Webhook errors
//! - 9xx: General / internal errors
//!
//! [`HybridPayError::kind`] folds every variant onto the coarse
//! [`ErrorKind`] taxonomy that API callers branch on.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{ListingId, OrderId, OrderStatus, UserId, VerificationStatus, WalletId, WithdrawalId};

/// Central error enum for all HybridPay operations.
#[derive(Debug, Error)]
pub enum HybridPayError {
    // =================================================================
    // Validation / Lookup Errors (1xx)
    // =================================================================
    /// The request failed validation (bad quantity, self-purchase, etc.).
    #[error("HP_ERR_100: Validation failed: {reason}")]
    Validation { reason: String },

    #[error("HP_ERR_101: Listing not found: {0}")]
    ListingNotFound(ListingId),

    #[error("HP_ERR_102: Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("HP_ERR_103: User not found: {0}")]
    UserNotFound(UserId),

    #[error("HP_ERR_104: Withdrawal not found: {0}")]
    WithdrawalNotFound(WithdrawalId),

    /// The order state machine does not allow this transition.
    #[error("HP_ERR_105: Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Listing stock cannot cover the requested quantity.
    #[error("HP_ERR_106: Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    // =================================================================
    // Balance / Ledger Errors (2xx)
    // =================================================================
    /// Not enough available balance to perform the operation.
    #[error("HP_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Not enough escrowed (pending) balance to release or reverse.
    #[error("HP_ERR_201: Insufficient pending balance: need {needed}, have {available}")]
    InsufficientPending { needed: Decimal, available: Decimal },

    #[error("HP_ERR_202: Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// Replaying a wallet's history did not reproduce its balance.
    #[error("HP_ERR_203: Ledger invariant violation: {reason}")]
    LedgerInvariantViolation { reason: String },

    // =================================================================
    // Identity / Fee Errors (3xx)
    // =================================================================
    /// Identity verification has not been approved for this user.
    #[error("HP_ERR_300: Identity not verified (status {status})")]
    NotVerified { status: VerificationStatus },

    /// The amount is too small to cover the fees.
    #[error("HP_ERR_310: Fee calculation failed: {reason}")]
    FeeCalculation { reason: String },

    // =================================================================
    // External Collaborator Errors (4xx)
    // =================================================================
    /// A payment, payout, or fraud collaborator errored.
    #[error("HP_ERR_400: External service {service} failed: {reason}")]
    ExternalService { service: String, reason: String },

    /// A collaborator call exceeded its bounded timeout.
    #[error("HP_ERR_401: External service {service} timed out after {timeout_ms}ms")]
    CollaboratorTimeout { service: String, timeout_ms: u64 },

    /// The order was committed but its payment intent could not be created.
    /// The order stays PENDING without a payment reference; retry is safe.
    #[error("HP_ERR_402: Payment intent for {order_id} not created: {reason}")]
    PaymentIntentFailed { order_id: OrderId, reason: String },

    // =================================================================
    // Concurrency Errors (5xx)
    // =================================================================
    /// Lock contention or a stale read. Always retryable.
    #[error("HP_ERR_500: Concurrency conflict: {reason}")]
    ConcurrencyConflict { reason: String },

    // =================================================================
    // Webhook Errors (6xx)
    // =================================================================
    /// The webhook signature header is missing, malformed, stale, or wrong.
    #[error("HP_ERR_600: Webhook signature rejected: {reason}")]
    WebhookSignature { reason: String },

    /// The webhook payload could not be parsed.
    #[error("HP_ERR_601: Malformed webhook payload: {reason}")]
    MalformedWebhook { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    #[error("HP_ERR_900: Internal error: {0}")]
    Internal(String),

    #[error("HP_ERR_901: Serialization error: {0}")]
    Serialization(String),

    #[error("HP_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

/// Coarse error taxonomy exposed to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input. Never retried automatically.
    Validation,
    /// Business rule violation surfaced to the user.
    InsufficientBalance,
    /// Identity gate.
    NotVerified,
    /// Amount too small to cover fees.
    FeeCalculation,
    /// Collaborator unreachable or errored. Retryable.
    ExternalService,
    /// Lock contention or stale state. Retryable.
    ConcurrencyConflict,
    /// Webhook authentication or parsing failed (4xx-equivalent).
    WebhookRejected,
    Internal,
}

/// Message shown to users for collaborator and internal failures.
const GENERIC_RETRY_MESSAGE: &str =
    "The payment service is temporarily unavailable. Please try again.";

impl HybridPayError {
    /// Map this error onto the caller-facing taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. }
            | Self::ListingNotFound(_)
            | Self::OrderNotFound(_)
            | Self::UserNotFound(_)
            | Self::WithdrawalNotFound(_)
            | Self::InvalidTransition { .. }
            | Self::InsufficientStock { .. } => ErrorKind::Validation,
            Self::InsufficientBalance { .. } | Self::InsufficientPending { .. } => {
                ErrorKind::InsufficientBalance
            }
            Self::NotVerified { .. } => ErrorKind::NotVerified,
            Self::FeeCalculation { .. } => ErrorKind::FeeCalculation,
            Self::ExternalService { .. }
            | Self::CollaboratorTimeout { .. }
            | Self::PaymentIntentFailed { .. } => ErrorKind::ExternalService,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::WebhookSignature { .. } | Self::MalformedWebhook { .. } => {
                ErrorKind::WebhookRejected
            }
            Self::WalletNotFound(_)
            | Self::LedgerInvariantViolation { .. }
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may safely retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ExternalService | ErrorKind::ConcurrencyConflict
        )
    }

    /// Message safe to show an end user. Collaborator internals never leak.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::ExternalService | ErrorKind::Internal => GENERIC_RETRY_MESSAGE.to_string(),
            ErrorKind::ConcurrencyConflict => {
                "Your account is busy with another request. Please try again.".to_string()
            }
            ErrorKind::WebhookRejected => "Invalid webhook request.".to_string(),
            ErrorKind::Validation
            | ErrorKind::InsufficientBalance
            | ErrorKind::NotVerified
            | ErrorKind::FeeCalculation => self.user_detail(),
        }
    }

    fn user_detail(&self) -> String {
        match self {
            Self::Validation { reason } => reason.clone(),
            Self::ListingNotFound(_) => "This listing is no longer available.".to_string(),
            Self::OrderNotFound(_) => "Order not found.".to_string(),
            Self::UserNotFound(_) => "Account not found.".to_string(),
            Self::WithdrawalNotFound(_) => "Withdrawal not found.".to_string(),
            Self::InvalidTransition { from, to } => {
                format!("This order cannot move from {from} to {to}.")
            }
            Self::InsufficientStock { available, .. } => {
                format!("Only {available} item(s) left in stock.")
            }
            Self::InsufficientBalance { needed, available }
            | Self::InsufficientPending { needed, available } => {
                format!("Insufficient balance: {needed} required, {available} available.")
            }
            Self::NotVerified { .. } => {
                "Identity verification must be approved before withdrawing.".to_string()
            }
            Self::FeeCalculation { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, HybridPayError>;

impl From<serde_json::Error> for HybridPayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
