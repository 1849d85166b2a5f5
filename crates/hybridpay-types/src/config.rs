//! Configuration types for the HybridPay engine.
//!
//! [`FeeRates`] is the injected fee-policy value object; the settlement
//! crate refreshes it from the persistent config store and falls back to
//! [`FeeRates::default`] when that store is unreachable. [`EngineConfig`]
//! carries the operational knobs (timeouts, TTLs, webhook secret).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, HybridPayError, Result, WithdrawalMethod};

/// Percent + flat pair charged on one withdrawal rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFee {
    pub percent: Decimal,
    pub flat: Decimal,
}

impl WithdrawalFee {
    #[must_use]
    pub const fn new(percent: Decimal, flat: Decimal) -> Self {
        Self { percent, flat }
    }
}

/// Per-rail withdrawal fee schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalFeeSchedule {
    pub standard: WithdrawalFee,
    pub bitcoin: WithdrawalFee,
    pub ethereum: WithdrawalFee,
    pub litecoin: WithdrawalFee,
    pub usdt: WithdrawalFee,
}

impl WithdrawalFeeSchedule {
    /// Fee pair for `method`.
    #[must_use]
    pub fn for_method(&self, method: WithdrawalMethod) -> WithdrawalFee {
        match method {
            WithdrawalMethod::Standard => self.standard,
            WithdrawalMethod::Bitcoin => self.bitcoin,
            WithdrawalMethod::Ethereum => self.ethereum,
            WithdrawalMethod::Litecoin => self.litecoin,
            WithdrawalMethod::Usdt => self.usdt,
        }
    }

    fn entries(&self) -> [(WithdrawalMethod, WithdrawalFee); 5] {
        [
            (WithdrawalMethod::Standard, self.standard),
            (WithdrawalMethod::Bitcoin, self.bitcoin),
            (WithdrawalMethod::Ethereum, self.ethereum),
            (WithdrawalMethod::Litecoin, self.litecoin),
            (WithdrawalMethod::Usdt, self.usdt),
        ]
    }
}

impl Default for WithdrawalFeeSchedule {
    fn default() -> Self {
        Self {
            standard: WithdrawalFee::new(Decimal::ZERO, Decimal::new(25, 2)),
            bitcoin: WithdrawalFee::new(Decimal::new(1, 2), Decimal::new(200, 2)),
            ethereum: WithdrawalFee::new(Decimal::new(1, 2), Decimal::new(500, 2)),
            litecoin: WithdrawalFee::new(Decimal::new(1, 2), Decimal::new(50, 2)),
            usdt: WithdrawalFee::new(Decimal::new(5, 3), Decimal::new(100, 2)),
        }
    }
}

/// Rates consumed by the fee policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    /// Percent of the discounted subtotal charged to the buyer.
    pub buyer_service_percent: Decimal,
    /// Flat amount added to every buyer service fee.
    pub buyer_service_flat: Decimal,
    /// Percent of the subtotal withheld from the seller.
    pub seller_commission_percent: Decimal,
    /// Membership discount rate applied to the subtotal.
    pub discount_rate: Decimal,
    #[serde(default)]
    pub withdrawal: WithdrawalFeeSchedule,
}

impl Default for FeeRates {
    fn default() -> Self {
        Self {
            buyer_service_percent: Decimal::new(3, 2),
            buyer_service_flat: Decimal::new(50, 2),
            seller_commission_percent: Decimal::new(10, 2),
            discount_rate: Decimal::new(5, 2),
            withdrawal: WithdrawalFeeSchedule::default(),
        }
    }
}

impl FeeRates {
    /// Reject negative amounts and percentages outside `[0, 1)`.
    ///
    /// # Errors
    /// Returns `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check_percent("buyer_service_percent", self.buyer_service_percent)?;
        check_flat("buyer_service_flat", self.buyer_service_flat)?;
        check_percent("seller_commission_percent", self.seller_commission_percent)?;
        check_percent("discount_rate", self.discount_rate)?;
        for (method, fee) in self.withdrawal.entries() {
            check_percent(&format!("withdrawal.{method}.percent"), fee.percent)?;
            check_flat(&format!("withdrawal.{method}.flat"), fee.flat)?;
        }
        Ok(())
    }
}

fn check_percent(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() || value >= Decimal::ONE {
        return Err(HybridPayError::Configuration(format!(
            "{field} must be in [0, 1), got {value}"
        )));
    }
    Ok(())
}

fn check_flat(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() {
        return Err(HybridPayError::Configuration(format!(
            "{field} cannot be negative, got {value}"
        )));
    }
    Ok(())
}

/// Operational configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ISO currency code passed to collaborators (lowercase).
    pub currency: String,
    /// Global switch routing every withdrawal to manual review.
    pub manual_payments_enabled: bool,
    /// Bound on every collaborator call.
    pub collaborator_timeout_ms: u64,
    /// Bound on waiting for a per-wallet or per-order lock.
    pub lock_timeout_ms: u64,
    /// Unpaid PENDING orders older than this are cancelled by the sweeper.
    pub pending_order_ttl_minutes: i64,
    /// DELIVERED orders older than this are auto-confirmed.
    pub auto_confirm_after_hours: i64,
    pub sweep_interval_secs: u64,
    /// Shared secret for webhook signatures. Never logged.
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub recent_transactions_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: constants::DEFAULT_CURRENCY.to_string(),
            manual_payments_enabled: false,
            collaborator_timeout_ms: constants::DEFAULT_COLLABORATOR_TIMEOUT_MS,
            lock_timeout_ms: constants::DEFAULT_LOCK_TIMEOUT_MS,
            pending_order_ttl_minutes: constants::DEFAULT_PENDING_ORDER_TTL_MINUTES,
            auto_confirm_after_hours: constants::DEFAULT_AUTO_CONFIRM_HOURS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
            webhook_secret: String::new(),
            webhook_tolerance_secs: constants::DEFAULT_WEBHOOK_TOLERANCE_SECS,
            recent_transactions_limit: constants::DEFAULT_RECENT_TRANSACTIONS_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Build from `HYBRIDPAY_*` environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Used by [`Self::from_env`].
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let get = |name: &str| lookup(&format!("HYBRIDPAY_{name}"));

        if let Some(v) = get("CURRENCY") {
            cfg.currency = v.to_lowercase();
        }
        if let Some(v) = get("MANUAL_PAYMENTS_ENABLED") {
            cfg.manual_payments_enabled = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
        }
        parse_into(get("COLLABORATOR_TIMEOUT_MS"), &mut cfg.collaborator_timeout_ms);
        parse_into(get("LOCK_TIMEOUT_MS"), &mut cfg.lock_timeout_ms);
        parse_into(get("PENDING_ORDER_TTL_MINUTES"), &mut cfg.pending_order_ttl_minutes);
        parse_into(get("AUTO_CONFIRM_AFTER_HOURS"), &mut cfg.auto_confirm_after_hours);
        parse_into(get("SWEEP_INTERVAL_SECS"), &mut cfg.sweep_interval_secs);
        if let Some(v) = get("WEBHOOK_SECRET") {
            cfg.webhook_secret = v;
        }
        parse_into(get("WEBHOOK_TOLERANCE_SECS"), &mut cfg.webhook_tolerance_secs);
        parse_into(get("RECENT_TRANSACTIONS_LIMIT"), &mut cfg.recent_transactions_limit);
        cfg
    }

    /// # Errors
    /// Returns `Configuration` for zero timeouts or an empty currency.
    pub fn validate(&self) -> Result<()> {
        if self.currency.is_empty() {
            return Err(HybridPayError::Configuration("currency is empty".into()));
        }
        if self.collaborator_timeout_ms == 0 || self.lock_timeout_ms == 0 {
            return Err(HybridPayError::Configuration(
                "timeouts must be non-zero".into(),
            ));
        }
        if self.pending_order_ttl_minutes <= 0 || self.auto_confirm_after_hours <= 0 {
            return Err(HybridPayError::Configuration(
                "order windows must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_into<T: std::str::FromStr>(raw: Option<String>, slot: &mut T) {
    if let Some(parsed) = raw.and_then(|v| v.trim().parse().ok()) {
        *slot = parsed;
    }
}
