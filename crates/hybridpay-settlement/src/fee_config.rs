//! Current fee-rate snapshot with refresh from the persistent source.

use std::sync::Arc;
use std::time::Duration;

use hybridpay_types::{FeeRates, Result};
use parking_lot::RwLock;

use crate::collaborators::{FeeConfigSource, call_with_timeout};

/// Holds the rates every fee computation reads.
///
/// Readers take an `Arc` snapshot, so a refresh never changes the rates
/// halfway through one order.
#[derive(Debug)]
pub struct FeeConfig {
    current: RwLock<Arc<FeeRates>>,
}

impl FeeConfig {
    #[must_use]
    pub fn new(rates: FeeRates) -> Self {
        Self {
            current: RwLock::new(Arc::new(rates)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<FeeRates> {
        Arc::clone(&self.current.read())
    }

    /// Replace the snapshot after validating it.
    ///
    /// # Errors
    /// `Configuration` if the rates are invalid; the snapshot is unchanged.
    pub fn set(&self, rates: FeeRates) -> Result<()> {
        rates.validate()?;
        *self.current.write() = Arc::new(rates);
        Ok(())
    }

    /// Load rates from `source`. On failure, timeout, or invalid rates the
    /// last known snapshot stays in effect.
    ///
    /// Returns whether the snapshot was replaced.
    pub async fn refresh(&self, source: &dyn FeeConfigSource, timeout: Duration) -> bool {
        match call_with_timeout("fee-config", timeout, source.load_fee_rates()).await {
            Ok(rates) => match self.set(rates) {
                Ok(()) => {
                    tracing::info!("fee rates refreshed");
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fee config rejected, keeping previous rates");
                    false
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "fee config unavailable, keeping previous rates");
                false
            }
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self::new(FeeRates::default())
    }
}
