//! Seller commission and escrowed earnings.

use hybridpay_types::FeeRates;
use hybridpay_types::money::round_cents;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a sale price is split between the platform and the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSplit {
    pub commission: Decimal,
    pub seller_earnings: Decimal,
}

/// `commission = round(sale_price × pct)`, `earnings = round(sale_price − commission)`.
///
/// `commission + seller_earnings == round(sale_price)` always holds.
#[must_use]
pub fn compute_seller_earnings(sale_price: Decimal, rates: &FeeRates) -> SellerSplit {
    let commission = round_cents(sale_price * rates.seller_commission_percent);
    let seller_earnings = round_cents(sale_price - commission);
    SellerSplit {
        commission,
        seller_earnings,
    }
}
