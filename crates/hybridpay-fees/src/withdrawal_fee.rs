//! Withdrawal fee and net payout.

use hybridpay_types::money::{is_cent_precise, round_cents};
use hybridpay_types::{FeeRates, HybridPayError, Result, WithdrawalMethod};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Gross-to-net breakdown for a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalBreakdown {
    pub fee: Decimal,
    pub net_amount: Decimal,
}

/// Compute `{fee, net_amount}` for withdrawing `amount` over `method`.
///
/// `fee = round(amount × pct + flat)`, `net = max(0, amount − fee)`.
///
/// # Errors
/// - `Validation` if `amount` is not positive or has sub-cent precision.
/// - `FeeCalculation` if the fee consumes the whole amount.
pub fn compute_withdrawal_breakdown(
    amount: Decimal,
    method: WithdrawalMethod,
    rates: &FeeRates,
) -> Result<WithdrawalBreakdown> {
    if amount <= Decimal::ZERO {
        return Err(HybridPayError::Validation {
            reason: "Withdrawal amount must be greater than zero".into(),
        });
    }
    if !is_cent_precise(amount) {
        return Err(HybridPayError::Validation {
            reason: format!("Withdrawal amount {amount} has more than two decimal places"),
        });
    }

    let schedule = rates.withdrawal.for_method(method);
    let fee = round_cents(amount * schedule.percent + schedule.flat);
    let net_amount = round_cents((amount - fee).max(Decimal::ZERO));

    if net_amount <= Decimal::ZERO {
        return Err(HybridPayError::FeeCalculation {
            reason: format!(
                "Amount {amount} is too small to cover the {method} withdrawal fee of {fee}"
            ),
        });
    }

    Ok(WithdrawalBreakdown { fee, net_amount })
}

#[cfg(test)]
mod tests {
    use hybridpay_types::ErrorKind;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn standard_flat_fee() {
        let rates = FeeRates::default();
        let b = compute_withdrawal_breakdown(dec!(50.00), WithdrawalMethod::Standard, &rates)
            .unwrap();
        assert_eq!(b.fee, dec!(0.25));
        assert_eq!(b.net_amount, dec!(49.75));
    }

    #[test]
    fn crypto_percent_plus_flat() {
        let rates = FeeRates::default();
        let btc =
            compute_withdrawal_breakdown(dec!(100.00), WithdrawalMethod::Bitcoin, &rates).unwrap();
        assert_eq!(btc.fee, dec!(3.00));
        assert_eq!(btc.net_amount, dec!(97.00));

        let usdt =
            compute_withdrawal_breakdown(dec!(101.00), WithdrawalMethod::Usdt, &rates).unwrap();
        // 101 × 0.005 + 1.00 = 1.505 → 1.51
        assert_eq!(usdt.fee, dec!(1.51));
        assert_eq!(usdt.net_amount, dec!(99.49));
    }

    #[test]
    fn fee_consuming_amount_is_rejected() {
        let rates = FeeRates::default();
        let err = compute_withdrawal_breakdown(dec!(5.00), WithdrawalMethod::Ethereum, &rates)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeeCalculation);

        let err = compute_withdrawal_breakdown(dec!(0.25), WithdrawalMethod::Standard, &rates)
            .unwrap_err();
        assert!(matches!(err, HybridPayError::FeeCalculation { .. }));
    }

    #[test]
    fn smallest_positive_net() {
        let rates = FeeRates::default();
        let b = compute_withdrawal_breakdown(dec!(0.26), WithdrawalMethod::Standard, &rates)
            .unwrap();
        assert_eq!(b.net_amount, dec!(0.01));
    }

    #[test]
    fn non_positive_or_sub_cent_amount_is_validation() {
        let rates = FeeRates::default();
        for amount in [dec!(0), dec!(-10), dec!(10.001)] {
            let err = compute_withdrawal_breakdown(amount, WithdrawalMethod::Standard, &rates)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "amount {amount}");
        }
    }
}
