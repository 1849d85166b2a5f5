//! Ledger replay verification.
//!
//! Invariant checked per wallet and per bucket:
//! ```text
//! entries ordered by sequence:
//!   balance_before[0] == 0
//!   balance_after[n]  == balance_before[n] + amount[n]
//!   balance_after[n]  == balance_before[n + 1]
//!   balance_after[last] == wallet bucket balance
//!   balance_after[n]  >= 0
//! ```
//!
//! A failure here means a write bypassed the ledger primitives. Callers
//! should treat it as critical.

use hybridpay_types::{HybridPayError, LedgerBucket, Result, Wallet, WalletTransaction};
use rust_decimal::Decimal;

/// Replay `entries` (all entries of `wallet`, any order) against its balances.
///
/// # Errors
/// Returns [`HybridPayError::LedgerInvariantViolation`] describing the first
/// discontinuity found.
pub fn verify_wallet_chain(wallet: &Wallet, entries: &[WalletTransaction]) -> Result<()> {
    let mut sorted: Vec<&WalletTransaction> = entries.iter().collect();
    sorted.sort_by_key(|tx| tx.sequence);

    for bucket in [LedgerBucket::Available, LedgerBucket::Pending] {
        let mut running = Decimal::ZERO;
        for tx in sorted.iter().filter(|tx| tx.bucket == bucket) {
            if tx.wallet_id != wallet.id {
                return Err(violation(format!(
                    "entry {} belongs to {}, not {}",
                    tx.id, tx.wallet_id, wallet.id
                )));
            }
            if tx.balance_before != running {
                return Err(violation(format!(
                    "{} {bucket} chain broken at seq {}: before {} != previous after {running}",
                    wallet.id, tx.sequence, tx.balance_before
                )));
            }
            if tx.balance_before + tx.amount != tx.balance_after {
                return Err(violation(format!(
                    "{} seq {}: {} + {} != {}",
                    wallet.id, tx.sequence, tx.balance_before, tx.amount, tx.balance_after
                )));
            }
            if tx.balance_after < Decimal::ZERO {
                return Err(violation(format!(
                    "{} {bucket} went negative at seq {}",
                    wallet.id, tx.sequence
                )));
            }
            running = tx.balance_after;
        }

        let current = wallet.bucket(bucket);
        if running != current {
            return Err(violation(format!(
                "{} {bucket} replays to {running}, wallet holds {current}",
                wallet.id
            )));
        }
    }
    Ok(())
}

fn violation(reason: String) -> HybridPayError {
    tracing::error!(%reason, "ledger invariant violation");
    HybridPayError::LedgerInvariantViolation { reason }
}
