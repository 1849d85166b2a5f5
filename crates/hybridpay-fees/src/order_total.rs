//! Buyer-side order total.
//!
//! ```text
//! discount            = round(target × discount_rate)         (0 if not eligible)
//! amount_after_disc   = round(target − discount)
//! service_fee         = round(amount_after_disc × pct + flat)
//! total               = round(amount_after_disc + service_fee)
//! ```

use hybridpay_types::FeeRates;
use hybridpay_types::money::round_cents;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Breakdown of what the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotal {
    pub discount: Decimal,
    pub amount_after_discount: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

/// Compute the buyer total for `target_amount`.
///
/// `membership_discount_active` must come from the server-side account
/// record; the caller is responsible for never passing a client-asserted
/// flag here.
#[must_use]
pub fn compute_order_total(
    target_amount: Decimal,
    membership_discount_active: bool,
    rates: &FeeRates,
) -> OrderTotal {
    let discount = if membership_discount_active {
        round_cents(target_amount * rates.discount_rate)
    } else {
        Decimal::ZERO
    };
    let amount_after_discount = round_cents(target_amount - discount);
    let service_fee =
        round_cents(amount_after_discount * rates.buyer_service_percent + rates.buyer_service_flat);
    let total = round_cents(amount_after_discount + service_fee);

    tracing::trace!(
        %target_amount,
        %discount,
        %service_fee,
        %total,
        "order total computed"
    );

    OrderTotal {
        discount,
        amount_after_discount,
        service_fee,
        total,
    }
}
