// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Stripe webhook ingest: authenticate, classify, dispatch.
//!
//! No event is trusted unverified. Once a signature checks out the event is
//! acknowledged 200 regardless of the downstream business-logic outcome;
//! a handler failure is operator-visible in the logs but is not transient,
//! so telling the processor to redeliver would only create storms.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    providers::stripe::{verify_signature, StripeEvent, WebhookEvent},
    reconcile,
    state::AppState,
};

const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Acknowledgement body returned to the processor.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Stripe webhook endpoint.
///
/// Takes the raw body (required for signature verification) plus the
/// `Stripe-Signature` header.
#[utoipa::path(
    post,
    path = "/v1/webhooks/stripe",
    tag = "Webhooks",
    request_body(content = String, description = "Raw Stripe webhook payload"),
    responses(
        (status = 200, description = "Event verified and acknowledged", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature"),
        (status = 503, description = "Webhook secret not configured")
    )
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Err(ApiError::service_unavailable(
            "Webhook ingest is not configured. Set STRIPE_WEBHOOK_SECRET.",
        ));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;

    if let Err(reason) = verify_signature(secret, &body, signature, Utc::now().timestamp()) {
        warn!(reason = %reason, "webhook signature verification failed");
        return Err(ApiError::bad_request("Invalid webhook signature"));
    }

    let event = StripeEvent::from_payload(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {e}")))?;

    let parsed = match WebhookEvent::parse(&event) {
        Ok(parsed) => parsed,
        Err(parse_error) => {
            // Verified but malformed for its type: redelivery cannot fix it.
            error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %parse_error,
                "webhook event object could not be parsed"
            );
            return Ok(Json(WebhookAck { received: true }));
        }
    };

    if let Err(handle_error) =
        reconcile::handle_event(&state.db, state.payouts.as_deref(), parsed).await
    {
        error!(
            event_id = %event.id,
            event_type = %event.event_type,
            error = %handle_error,
            "webhook event handling failed"
        );
    }

    Ok(Json(WebhookAck { received: true }))
}
