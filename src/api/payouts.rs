// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Payout endpoints: manual initiation, manual retry, and status reads.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    payouts::{self, PayoutError},
    providers::PayoutProvider,
    state::AppState,
    storage::{PayoutStatus, StoreError, StoredPayment},
};

/// Request body for a manual payout retry.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RetryPayoutRequest {
    /// Why the operator is retrying (e.g. "transfer stuck since Monday").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payout state returned to operators and dashboards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayoutResponse {
    pub payment_id: String,
    pub payout_status: PayoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retried_at: Option<String>,
}

fn to_response(payment: &StoredPayment) -> PayoutResponse {
    PayoutResponse {
        payment_id: payment.payment_id.clone(),
        payout_status: payment.payout_status,
        transaction_id: payment.payout_transaction_id.clone(),
        retry_count: payment.payout_retry_count,
        retry_reason: payment.payout_retry_reason.clone(),
        failure_reason: payment.payout_failure_reason.clone(),
        initiated_at: payment.payout_initiated_at.map(|t| t.to_rfc3339()),
        retried_at: payment.payout_retried_at.map(|t| t.to_rfc3339()),
    }
}

fn payout_provider(state: &AppState) -> Result<Arc<dyn PayoutProvider>, ApiError> {
    state.payouts.clone().ok_or_else(|| {
        ApiError::service_unavailable(
            "Wallet provider is not configured. Set WALLET_PROVIDER_API_KEY.",
        )
    })
}

fn map_payout_error(error: PayoutError) -> ApiError {
    match error {
        PayoutError::PaymentNotFound(_) => ApiError::not_found(error.to_string()),
        PayoutError::PaymentNotCompleted(_) | PayoutError::WalletNotConfigured(_) => {
            ApiError::unprocessable(error.to_string())
        }
        PayoutError::AlreadyInProgress(_) | PayoutError::AlreadyCompleted(_) => {
            ApiError::conflict(error.to_string())
        }
        PayoutError::Provider(provider_error) => ApiError::bad_gateway(provider_error.to_string()),
        PayoutError::Store(StoreError::NotFound(message)) => ApiError::not_found(message),
        PayoutError::Store(StoreError::InvalidState(message)) => ApiError::conflict(message),
        PayoutError::Store(store_error) => {
            ApiError::internal(format!("Storage failure: {store_error}"))
        }
    }
}

/// Manually initiate the payout for a completed payment.
///
/// Recovery path for charges reconciled before the seller registered a
/// wallet or while the provider was unavailable.
#[utoipa::path(
    post,
    path = "/v1/payments/{payment_id}/payout",
    tag = "Payouts",
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 201, description = "Payout initiated", body = PayoutResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payout already in progress or completed"),
        (status = 422, description = "Payment not completed or wallet not configured"),
        (status = 502, description = "Wallet provider call failed"),
        (status = 503, description = "Wallet provider not configured")
    )
)]
pub async fn initiate_payout(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    let provider = payout_provider(&state)?;
    let payment = payouts::initiate(&state.db, provider.as_ref(), &payment_id)
        .await
        .map_err(map_payout_error)?;
    Ok((StatusCode::CREATED, Json(to_response(&payment))))
}

/// Manually retry a payout that has not completed.
#[utoipa::path(
    post,
    path = "/v1/payments/{payment_id}/payout/retries",
    tag = "Payouts",
    params(("payment_id" = String, Path, description = "Payment ID")),
    request_body = RetryPayoutRequest,
    responses(
        (status = 201, description = "Payout retried", body = PayoutResponse),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payout already completed"),
        (status = 422, description = "Payment not completed or wallet not configured"),
        (status = 502, description = "Wallet provider call failed"),
        (status = 503, description = "Wallet provider not configured")
    )
)]
pub async fn retry_payout(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    Json(request): Json<RetryPayoutRequest>,
) -> Result<(StatusCode, Json<PayoutResponse>), ApiError> {
    let provider = payout_provider(&state)?;
    let reason = request.reason.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    });

    let payment = payouts::retry(&state.db, provider.as_ref(), &payment_id, reason)
        .await
        .map_err(map_payout_error)?;
    Ok((StatusCode::CREATED, Json(to_response(&payment))))
}

/// Read payout state, refreshing from the provider while a transfer is in
/// flight.
#[utoipa::path(
    get,
    path = "/v1/payments/{payment_id}/payout",
    tag = "Payouts",
    params(("payment_id" = String, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payout state", body = PayoutResponse),
        (status = 404, description = "Payment not found")
    )
)]
pub async fn get_payout(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PayoutResponse>, ApiError> {
    let payment = match state.payouts.as_deref() {
        Some(provider) => payouts::refresh(&state.db, provider, &payment_id)
            .await
            .map_err(map_payout_error)?,
        None => state
            .db
            .get_payment(&payment_id)
            .map_err(|e| ApiError::internal(format!("Storage failure: {e}")))?
            .ok_or_else(|| ApiError::not_found(format!("Payment {payment_id} not found")))?,
    };
    Ok(Json(to_response(&payment)))
}
