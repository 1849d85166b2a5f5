//! Webhook authentication and event parsing.
//!
//! Signature header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`.
//! The signed payload is `"{t}.{raw body}"` under HMAC-SHA256 with the
//! shared endpoint secret. Events older than the tolerance are rejected to
//! stop replays.

use hmac::{Hmac, Mac};
use hybridpay_types::{HybridPayError, PayoutAccountStatus, Result};
use serde::Deserialize;
use sha2::Sha256;

/// Verify `sig_header` over `payload` at time `now_unix`.
///
/// # Errors
/// `WebhookSignature` if the header is malformed, no `v1` signature
/// matches, or the timestamp is outside `tolerance_secs`.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<()> {
    if secret.is_empty() {
        return Err(rejected("webhook secret is not configured"));
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    let (Some(timestamp), false) = (timestamp, signatures.is_empty()) else {
        return Err(rejected("invalid signature header"));
    };

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| rejected("invalid signature timestamp"))?;
    let skew = now_unix.checked_sub(ts).map(i64::unsigned_abs);
    if skew.is_none_or(|skew| skew > tolerance_secs.unsigned_abs()) {
        return Err(rejected("signature timestamp outside tolerance"));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| rejected("invalid webhook secret"))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Constant-time comparison via verify_slice; any listed v1 may match
    // (secret rotation).
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(rejected("signature mismatch"))
    }
}

/// Compute the header a sender would attach. Used by tests and local tools.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // new_from_slice accepts keys of any length for HMAC.
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={timestamp}"),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={sig}")
}

fn rejected(reason: &str) -> HybridPayError {
    HybridPayError::WebhookSignature {
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

/// What an event asks the reconciler to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// `payment_intent.succeeded`.
    PaymentSucceeded { payment_ref: String },
    /// `account.updated`.
    PayoutAccountChanged {
        account_ref: String,
        status: PayoutAccountStatus,
    },
    /// `payout.paid`: match by transfer id, or by the withdrawal id we put
    /// in the metadata.
    PayoutPaid {
        transfer_ref: String,
        withdrawal_ref: Option<String>,
    },
    /// Any other type. Logged and acknowledged.
    Unsupported,
}

/// A parsed, authenticated event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub action: EventAction,
}

/// Parse a raw event body.
///
/// # Errors
/// `MalformedWebhook` if the envelope or a required object field is missing.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| malformed(format!("invalid envelope: {e}")))?;
    let object = &envelope.data.object;

    let action = match envelope.event_type.as_str() {
        "payment_intent.succeeded" => EventAction::PaymentSucceeded {
            payment_ref: required_str(object, "id")?,
        },
        "account.updated" => EventAction::PayoutAccountChanged {
            account_ref: required_str(object, "id")?,
            status: account_status(object),
        },
        "payout.paid" => EventAction::PayoutPaid {
            transfer_ref: required_str(object, "id")?,
            withdrawal_ref: object["metadata"]["withdrawal_id"]
                .as_str()
                .map(String::from),
        },
        _ => EventAction::Unsupported,
    };

    Ok(WebhookEvent {
        id: envelope.id,
        event_type: envelope.event_type,
        action,
    })
}

/// Map a connected-account object onto our three-state status.
#[must_use]
pub fn account_status(account: &serde_json::Value) -> PayoutAccountStatus {
    let payouts = account["payouts_enabled"].as_bool().unwrap_or(false);
    let charges = account["charges_enabled"].as_bool().unwrap_or(false);
    let disabled = account["requirements"]["disabled_reason"]
        .as_str()
        .is_some_and(|r| !r.is_empty());

    if payouts && charges {
        PayoutAccountStatus::Active
    } else if disabled {
        PayoutAccountStatus::Restricted
    } else {
        PayoutAccountStatus::Pending
    }
}

fn required_str(object: &serde_json::Value, field: &str) -> Result<String> {
    object[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| malformed(format!("data.object.{field} is missing")))
}

fn malformed(reason: String) -> HybridPayError {
    HybridPayError::MalformedWebhook { reason }
}
