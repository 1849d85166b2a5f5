//! System-wide constants for the HybridPay engine.

/// Default ISO currency code sent to collaborators.
pub const DEFAULT_CURRENCY: &str = "usd";

/// Bound on every external collaborator call, in milliseconds.
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 10_000;

/// Bound on waiting for a per-wallet or per-order lock, in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Unpaid orders older than this are expired by the sweeper.
pub const DEFAULT_PENDING_ORDER_TTL_MINUTES: i64 = 60;

/// Delivered orders are auto-confirmed after this many hours.
pub const DEFAULT_AUTO_CONFIRM_HOURS: i64 = 72;

/// Interval between sweeper runs.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Maximum age of a signed webhook timestamp.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Number of ledger entries returned by the wallet summary.
pub const DEFAULT_RECENT_TRANSACTIONS_LIMIT: usize = 20;

/// Processed webhook event ids to remember before evicting the oldest.
pub const WEBHOOK_EVENT_CACHE_SIZE: usize = 100_000;

/// Maximum units of a listing in one order.
pub const MAX_ORDER_QUANTITY: u32 = 1_000;

/// Attempts at generating a unique order number before giving up.
pub const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "HybridPay";
