// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Payment endpoints: checkout start, reads, and refunds.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    state::AppState,
    storage::{PaymentStatus, PayoutStatus, StoreError, StoredPayment},
};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to start a checkout against a payment link.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// Payment-link slug of the product being bought.
    pub payment_link: String,
    /// Buyer identity reference, when the storefront knows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    /// Stripe payment-intent id when the storefront already created one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

/// Payment returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    pub seller_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    /// Charged amount as a decimal string, e.g. `29.99`.
    pub amount_usd: String,
    /// Payout amount as a decimal string, e.g. `29.990000`.
    pub amount_usdc: String,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub payout_status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// List response for payments.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
    pub total: usize,
}

/// Query params for listing payments.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PaymentListQuery {
    /// Seller whose payments to list.
    pub seller_id: String,
}

/// Request body for a refund.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefundPaymentRequest {
    /// Partial amount as a decimal string (e.g. "10.00"); omit for a full
    /// refund.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Refund outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefundPaymentResponse {
    pub refund_id: String,
    pub refund_status: String,
    pub payment: PaymentResponse,
}

fn to_response(payment: &StoredPayment) -> PaymentResponse {
    PaymentResponse {
        payment_id: payment.payment_id.clone(),
        stripe_payment_intent_id: payment.stripe_payment_intent_id.clone(),
        product_id: payment.product_id.clone(),
        payment_link: payment.payment_link.clone(),
        seller_id: payment.seller_id.clone(),
        buyer_id: payment.buyer_id.clone(),
        amount_usd: payment.amount_usd_display(),
        amount_usdc: payment.amount_usdc_display(),
        currency: payment.currency.clone(),
        status: payment.status,
        failure_reason: payment.failure_reason.clone(),
        payout_status: payment.payout_status,
        refund_id: payment.refund_id.clone(),
        created_at: payment.created_at.to_rfc3339(),
        updated_at: payment.updated_at.to_rfc3339(),
        completed_at: payment.completed_at.map(|t| t.to_rfc3339()),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse a decimal USD string (max 2 decimal places) into minor units.
pub fn parse_usd_to_minor(amount: &str) -> Result<u64, ApiError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let whole_part = parts[0];
    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    let whole = whole_part
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("amount is too large"))?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) || fraction_part.len() > 2 {
        return Err(ApiError::bad_request(
            "amount must have at most 2 decimal places",
        ));
    }

    let fraction = if fraction_part.is_empty() {
        0
    } else if fraction_part.len() == 1 {
        fraction_part
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request("amount must be a valid positive number"))?
            * 10
    } else {
        fraction_part
            .parse::<u64>()
            .map_err(|_| ApiError::bad_request("amount must be a valid positive number"))?
    };

    let minor = whole
        .checked_mul(100)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| ApiError::bad_request("amount is too large"))?;

    if minor == 0 {
        return Err(ApiError::bad_request(
            "amount must be a valid positive number",
        ));
    }

    Ok(minor)
}

fn store_error(error: StoreError) -> ApiError {
    match error {
        StoreError::NotFound(message) => ApiError::not_found(message),
        StoreError::AlreadyExists(message) => ApiError::conflict(message),
        StoreError::InvalidState(message) => ApiError::conflict(message),
        other => ApiError::internal(format!("Storage failure: {other}")),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Start a checkout: create a pending payment priced from the product.
#[utoipa::path(
    post,
    path = "/v1/payments",
    tag = "Payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Payment link not found"),
        (status = 409, description = "Payment intent already used"),
        (status = 422, description = "Product not purchasable")
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let payment_link = request.payment_link.trim();
    if payment_link.is_empty() {
        return Err(ApiError::bad_request("payment_link must not be empty"));
    }

    let product = state
        .db
        .get_product_by_link(payment_link)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Payment link not found"))?;

    if !product.purchasable_at(Utc::now()) {
        return Err(ApiError::unprocessable(
            "Product is not available for purchase",
        ));
    }

    let payment = StoredPayment::new_pending(
        uuid::Uuid::new_v4().to_string(),
        request
            .payment_intent_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        product.product_id.clone(),
        product.payment_link.clone(),
        product.seller_id.clone(),
        request
            .buyer_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        product.price_usd_minor,
        product.price_usdc_minor,
        "usd".to_string(),
    );

    state.db.create_payment(&payment).map_err(store_error)?;
    info!(
        payment_id = %payment.payment_id,
        payment_link = %product.payment_link,
        "checkout started"
    );

    Ok((StatusCode::CREATED, Json(to_response(&payment))))
}

/// Get payment by ID.
#[utoipa::path(
    get,
    path = "/v1/payments/{payment_id}",
    tag = "Payments",
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment details", body = PaymentResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .db
        .get_payment(&payment_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;
    Ok(Json(to_response(&payment)))
}

/// List a seller's payments, newest first.
#[utoipa::path(
    get,
    path = "/v1/payments",
    tag = "Payments",
    params(PaymentListQuery),
    responses(
        (status = 200, description = "Payments listed", body = PaymentListResponse)
    )
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentListQuery>,
) -> Result<Json<PaymentListResponse>, ApiError> {
    let payments = state
        .db
        .list_payments_by_seller(&query.seller_id)
        .map_err(store_error)?;
    let mapped: Vec<PaymentResponse> = payments.iter().map(to_response).collect();
    Ok(Json(PaymentListResponse {
        total: mapped.len(),
        payments: mapped,
    }))
}

/// Refund a completed payment through the processor, then stamp the record.
#[utoipa::path(
    post,
    path = "/v1/payments/{payment_id}/refund",
    tag = "Payments",
    params(("payment_id" = String, Path, description = "Payment ID")),
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Refund created", body = RefundPaymentResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Payment not found"),
        (status = 422, description = "Payment not refundable"),
        (status = 502, description = "Processor call failed"),
        (status = 503, description = "Processor not configured")
    )
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<Json<RefundPaymentResponse>, ApiError> {
    let Some(stripe) = state.stripe.clone() else {
        return Err(ApiError::service_unavailable(
            "Refunds are not configured. Set STRIPE_SECRET_KEY.",
        ));
    };

    let payment = state
        .db
        .get_payment(&payment_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Payment not found"))?;

    if payment.status != PaymentStatus::Completed {
        return Err(ApiError::unprocessable(
            "Only completed payments can be refunded",
        ));
    }
    let Some(intent_id) = payment.stripe_payment_intent_id.as_deref() else {
        return Err(ApiError::unprocessable(
            "Payment has no processor reference to refund",
        ));
    };

    let amount_usd_minor = request
        .amount_usd
        .as_deref()
        .map(parse_usd_to_minor)
        .transpose()?;
    if let Some(amount) = amount_usd_minor {
        if amount > payment.amount_usd_minor {
            return Err(ApiError::bad_request(
                "Refund amount exceeds the charged amount",
            ));
        }
    }

    let reason = request.reason.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    });

    let refund = stripe
        .create_refund(intent_id, amount_usd_minor, reason.as_deref())
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;

    let updated = state
        .db
        .record_refund(
            &payment.payment_id,
            &refund.refund_id,
            amount_usd_minor.unwrap_or(payment.amount_usd_minor),
            reason,
        )
        .map_err(store_error)?;

    info!(
        payment_id = %updated.payment_id,
        refund_id = %refund.refund_id,
        "refund recorded"
    );

    Ok(Json(RefundPaymentResponse {
        refund_id: refund.refund_id,
        refund_status: refund.status,
        payment: to_response(&updated),
    }))
}
