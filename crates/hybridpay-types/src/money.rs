//! Fixed-point money helpers.
//!
//! Amounts are `rust_decimal::Decimal` everywhere; floating point never
//! touches a persisted field. Fee math rounds to cents with round-half-up
//! at every computed boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{HybridPayError, Result};

/// Number of decimal places carried by every stored amount.
pub const CENT_SCALE: u32 = 2;

/// Round to cents, half-up (midpoint away from zero).
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether `amount` is already representable in whole cents.
#[must_use]
pub fn is_cent_precise(amount: Decimal) -> bool {
    amount.normalize().scale() <= CENT_SCALE
}

/// Convert a cent-rounded amount into integer minor units for collaborator APIs.
///
/// # Errors
/// Returns `Validation` if the amount is negative or does not fit in `i64`.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    if amount.is_sign_negative() {
        return Err(HybridPayError::Validation {
            reason: format!("amount {amount} cannot be negative"),
        });
    }
    (round_cents(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| HybridPayError::Validation {
            reason: format!("amount {amount} is out of range"),
        })
}

/// Convert integer minor units back into a decimal amount.
#[must_use]
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CENT_SCALE)
}
