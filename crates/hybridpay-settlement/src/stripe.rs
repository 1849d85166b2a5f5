//! Stripe integration via REST API (no SDK dependency).
//!
//! Implements [`PaymentProcessor`] with `POST /v1/payment_intents` and
//! [`PayoutProvider`] with `POST /v1/transfers`. Requests are form-encoded
//! and carry an `Idempotency-Key` header so a retried call returns the
//! object created by the first attempt.

use std::collections::BTreeMap;

use async_trait::async_trait;
use hybridpay_types::{HybridPayError, Result};

use crate::collaborators::{
    PaymentIntent, PaymentIntentRequest, PaymentProcessor, PayoutProvider, Transfer,
    TransferRequest,
};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const SERVICE: &str = "stripe";

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    #[must_use]
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self::with_base_url(secret_key, DEFAULT_BASE_URL)
    }

    /// Point at a different API host (stripe-mock, a recording proxy).
    #[must_use]
    pub fn with_base_url(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        idempotency_key: &str,
        form: &[(String, String)],
    ) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| external(format!("request to {path} failed: {e}")))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| external(format!("invalid response from {path}: {e}")))?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            tracing::warn!(path, status = status.as_u16(), %message, "stripe request rejected");
            return Err(external(format!("{path} returned {status}: {message}")));
        }
        Ok(body)
    }
}

#[async_trait]
impl PaymentProcessor for StripeGateway {
    async fn create_payment_intent(&self, request: PaymentIntentRequest) -> Result<PaymentIntent> {
        let form = payment_intent_form(&request);
        let body = self
            .post_form("/v1/payment_intents", &request.idempotency_key, &form)
            .await?;
        let id = string_field(&body, "id")?;
        let client_secret = string_field(&body, "client_secret")?;
        Ok(PaymentIntent { id, client_secret })
    }
}

#[async_trait]
impl PayoutProvider for StripeGateway {
    async fn create_transfer(&self, request: TransferRequest) -> Result<Transfer> {
        let form = transfer_form(&request);
        let body = self
            .post_form("/v1/transfers", &request.idempotency_key, &form)
            .await?;
        Ok(Transfer {
            id: string_field(&body, "id")?,
        })
    }
}

fn payment_intent_form(request: &PaymentIntentRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount_cents.to_string()),
        ("currency".to_string(), request.currency.clone()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];
    push_metadata(&mut form, &request.metadata);
    form
}

fn transfer_form(request: &TransferRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), request.amount_cents.to_string()),
        ("currency".to_string(), request.currency.clone()),
        ("destination".to_string(), request.destination.clone()),
    ];
    push_metadata(&mut form, &request.metadata);
    form
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &BTreeMap<String, String>) {
    form.extend(
        metadata
            .iter()
            .map(|(k, v)| (format!("metadata[{k}]"), v.clone())),
    );
}

fn string_field(body: &serde_json::Value, field: &str) -> Result<String> {
    body[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| external(format!("response is missing `{field}`")))
}

fn external(reason: String) -> HybridPayError {
    HybridPayError::ExternalService {
        service: SERVICE.to_string(),
        reason,
    }
}
