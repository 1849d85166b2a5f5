//! Best-effort periodic maintenance: expire unpaid orders and auto-confirm
//! delivered ones. Nothing depends on it running on time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::SettlementCoordinator;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub auto_confirmed: usize,
}

/// Run both sweeps once at `now`.
pub async fn run_sweep(coordinator: &SettlementCoordinator, now: DateTime<Utc>) -> SweepReport {
    SweepReport {
        expired: coordinator.expire_unpaid_orders(now).await,
        auto_confirmed: coordinator.auto_confirm_delivered(now).await,
    }
}

/// Sweep every `period` until the handle is aborted.
pub fn spawn_sweeper(coordinator: Arc<SettlementCoordinator>, period: Duration) -> JoinHandle<()> {
    tracing::info!(period_secs = period.as_secs(), "sweeper started");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let report = run_sweep(&coordinator, Utc::now()).await;
            tracing::debug!(
                expired = report.expired,
                auto_confirmed = report.auto_confirmed,
                "sweep finished"
            );
        }
    })
}
