// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Stripe integration: webhook signature verification, event parsing, and
//! the refund API client.
//!
//! Card charging itself happens on the Stripe side; this module only
//! consumes signed webhook events and issues refunds.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum allowed age of a signed webhook timestamp.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

// =============================================================================
// Webhook Signature Verification
// =============================================================================

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>`) against the raw
/// request body and the shared endpoint secret.
///
/// The signed payload is `"{t}.{body}"`; the comparison is constant-time
/// via the HMAC verify primitive. Any `v1` entry in the header may match
/// (Stripe sends several during secret rotation).
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature_header: &str,
    now_unix: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(SignatureError::Mismatch)
}

/// Compute a `Stripe-Signature` header value for a payload. Used by tests
/// and local tooling to produce deliverable events.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

// =============================================================================
// Event Parsing
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("event body was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{event_type} event carried an invalid object: {message}")]
    InvalidObject {
        event_type: String,
        message: String,
    },
}

/// Raw webhook envelope: `{ id, type, data: { object } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn from_payload(payload: &[u8]) -> Result<Self, EventParseError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Payment-intent object fields the reconciler consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    /// Charged amount in fiat minor units.
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastPaymentError {
    pub message: Option<String>,
}

/// Checkout-session object fields the reconciler consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Parsed webhook event, dispatched by type.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PaymentSucceeded(PaymentIntent),
    PaymentFailed(PaymentIntent),
    PaymentCanceled(PaymentIntent),
    CheckoutCompleted(CheckoutSession),
    /// Acknowledged but otherwise ignored.
    Other { event_type: String },
}

impl WebhookEvent {
    pub fn parse(event: &StripeEvent) -> Result<Self, EventParseError> {
        let invalid = |e: serde_json::Error| EventParseError::InvalidObject {
            event_type: event.event_type.clone(),
            message: e.to_string(),
        };
        match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                let intent = serde_json::from_value(event.data.object.clone()).map_err(invalid)?;
                Ok(WebhookEvent::PaymentSucceeded(intent))
            }
            "payment_intent.payment_failed" => {
                let intent = serde_json::from_value(event.data.object.clone()).map_err(invalid)?;
                Ok(WebhookEvent::PaymentFailed(intent))
            }
            "payment_intent.canceled" => {
                let intent = serde_json::from_value(event.data.object.clone()).map_err(invalid)?;
                Ok(WebhookEvent::PaymentCanceled(intent))
            }
            "checkout.session.completed" => {
                let session = serde_json::from_value(event.data.object.clone()).map_err(invalid)?;
                Ok(WebhookEvent::CheckoutCompleted(session))
            }
            other => Ok(WebhookEvent::Other {
                event_type: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Refund API Client
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("stripe configuration missing: {0}")]
    MissingConfig(String),

    #[error("stripe request failed: {0}")]
    Request(String),

    #[error("stripe response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct RefundResult {
    pub refund_id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    api_base_url: String,
    secret_key: String,
    http: Client,
}

impl StripeClient {
    pub fn is_configured() -> bool {
        std::env::var("STRIPE_SECRET_KEY")
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn from_env() -> Result<Self, StripeError> {
        let api_base_url = std::env::var("STRIPE_API_BASE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StripeError::MissingConfig("STRIPE_SECRET_KEY".to_string()))?;

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StripeError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url,
            secret_key,
            http,
        })
    }

    /// Create a refund for a payment intent. `amount_usd_minor` of `None`
    /// refunds the full charge.
    pub async fn create_refund(
        &self,
        payment_intent_id: &str,
        amount_usd_minor: Option<u64>,
        reason: Option<&str>,
    ) -> Result<RefundResult, StripeError> {
        let mut form: Vec<(&str, String)> =
            vec![("payment_intent", payment_intent_id.to_string())];
        if let Some(amount) = amount_usd_minor {
            form.push(("amount", amount.to_string()));
        }
        if let Some(reason) = reason {
            form.push(("reason", reason.to_string()));
        }

        let response = self
            .http
            .post(format!(
                "{}/v1/refunds",
                self.api_base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| StripeError::Request(format!("POST /v1/refunds failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StripeError::Request(format!(
                "POST /v1/refunds returned {status}: {body}"
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            StripeError::InvalidResponse(format!("POST /v1/refunds invalid JSON: {e}"))
        })?;

        let refund_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StripeError::InvalidResponse("missing refund id in response".to_string())
            })?
            .to_string();
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("pending")
            .to_string();

        Ok(RefundResult { refund_id, status })
    }
}
