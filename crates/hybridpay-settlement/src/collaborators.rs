//! Contracts of the remote collaborators the engine calls.
//!
//! Every call goes through [`call_with_timeout`]; a mandatory call that
//! times out aborts the surrounding write, an optional one degrades.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use hybridpay_types::{BehaviorSignals, FeeRates, HybridPayError, Result, RiskAssessment};
use serde::{Deserialize, Serialize};

/// Request to charge the external portion of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRequest {
    pub amount_cents: i64,
    pub currency: String,
    /// Same key for every attempt on the same order.
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

/// Processor-side intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Handed to the client to complete payment.
    pub client_secret: String,
}

/// Outbound transfer to a connected payout account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub destination: String,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent>;
}

#[async_trait]
pub trait PayoutProvider: Send + Sync {
    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer>;
}

#[async_trait]
pub trait FraudScorer: Send + Sync {
    async fn analyze_behavior(&self, signals: &BehaviorSignals) -> Result<RiskAssessment>;
}

/// Persistent fee configuration (admin settings table, config service).
#[async_trait]
pub trait FeeConfigSource: Send + Sync {
    async fn load_fee_rates(&self) -> Result<FeeRates>;
}

/// Bound `fut` by `timeout`, mapping expiry to `CollaboratorTimeout`.
pub async fn call_with_timeout<T>(
    service: &str,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if let Ok(result) = tokio::time::timeout(timeout, fut).await {
        result
    } else {
        tracing::warn!(service, timeout_ms = duration_ms(timeout), "collaborator call timed out");
        Err(HybridPayError::CollaboratorTimeout {
            service: service.to_string(),
            timeout_ms: duration_ms(timeout),
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
