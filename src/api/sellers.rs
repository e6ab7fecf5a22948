// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Seller endpoints: payout-wallet registration and the reporting summary.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    state::AppState,
    storage::{PaymentStatus, PayoutStatus, SellerWallet},
};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to register a seller's payout wallet.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterWalletRequest {
    /// Wallet id at the wallet provider.
    pub wallet_id: String,
    /// On-chain USDC destination address (0x + 40 hex chars).
    pub address: String,
}

/// Registered wallet returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SellerWalletResponse {
    pub seller_id: String,
    pub wallet_id: String,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Reporting summary over a seller's payments. Read-only aggregation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SellerSummaryResponse {
    pub seller_id: String,
    pub payment_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    /// Sum of completed charges in fiat minor units.
    pub gross_usd_minor: u64,
    /// Sum of completed charges in USDC minor units.
    pub gross_usdc_minor: u64,
    pub payouts_completed: usize,
    pub payouts_in_flight: usize,
    pub payouts_failed: usize,
}

fn to_response(wallet: &SellerWallet) -> SellerWalletResponse {
    SellerWalletResponse {
        seller_id: wallet.seller_id.clone(),
        wallet_id: wallet.wallet_id.clone(),
        address: wallet.address.clone(),
        created_at: wallet.created_at.to_rfc3339(),
        updated_at: wallet.updated_at.to_rfc3339(),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate an EVM address.
fn validate_address(address: &str) -> Result<(), ApiError> {
    if !address.starts_with("0x") {
        return Err(ApiError::bad_request("Address must start with 0x"));
    }
    if address.len() != 42 {
        return Err(ApiError::bad_request(
            "Address must be 42 characters (0x + 40 hex)",
        ));
    }
    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::bad_request(
            "Address must contain only hex characters",
        ));
    }
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Register (or replace) a seller's payout wallet.
#[utoipa::path(
    put,
    path = "/v1/sellers/{seller_id}/wallet",
    tag = "Sellers",
    params(("seller_id" = String, Path, description = "Seller ID")),
    request_body = RegisterWalletRequest,
    responses(
        (status = 200, description = "Wallet registered", body = SellerWalletResponse),
        (status = 400, description = "Bad request")
    )
)]
pub async fn register_wallet(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
    Json(request): Json<RegisterWalletRequest>,
) -> Result<Json<SellerWalletResponse>, ApiError> {
    let wallet_id = request.wallet_id.trim();
    if wallet_id.is_empty() {
        return Err(ApiError::bad_request("wallet_id must not be empty"));
    }
    let address = request.address.trim();
    validate_address(address)?;

    let stored = state
        .db
        .put_seller_wallet(&SellerWallet::new(
            seller_id,
            wallet_id.to_string(),
            address.to_string(),
        ))
        .map_err(|e| ApiError::internal(format!("Failed to store wallet: {e}")))?;

    Ok(Json(to_response(&stored)))
}

/// Get a seller's registered payout wallet.
#[utoipa::path(
    get,
    path = "/v1/sellers/{seller_id}/wallet",
    tag = "Sellers",
    params(("seller_id" = String, Path, description = "Seller ID")),
    responses(
        (status = 200, description = "Registered wallet", body = SellerWalletResponse),
        (status = 404, description = "No wallet registered")
    )
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<SellerWalletResponse>, ApiError> {
    let wallet = state
        .db
        .get_seller_wallet(&seller_id)
        .map_err(|e| ApiError::internal(format!("Failed to read wallet: {e}")))?
        .ok_or_else(|| ApiError::not_found("Seller has no registered wallet"))?;
    Ok(Json(to_response(&wallet)))
}

/// Aggregate a seller's payments for dashboard display.
#[utoipa::path(
    get,
    path = "/v1/sellers/{seller_id}/summary",
    tag = "Sellers",
    params(("seller_id" = String, Path, description = "Seller ID")),
    responses(
        (status = 200, description = "Seller summary", body = SellerSummaryResponse)
    )
)]
pub async fn seller_summary(
    State(state): State<AppState>,
    Path(seller_id): Path<String>,
) -> Result<Json<SellerSummaryResponse>, ApiError> {
    let payments = state
        .db
        .list_payments_by_seller(&seller_id)
        .map_err(|e| ApiError::internal(format!("Failed to list payments: {e}")))?;

    let mut summary = SellerSummaryResponse {
        seller_id,
        payment_count: payments.len(),
        completed_count: 0,
        failed_count: 0,
        gross_usd_minor: 0,
        gross_usdc_minor: 0,
        payouts_completed: 0,
        payouts_in_flight: 0,
        payouts_failed: 0,
    };

    for payment in &payments {
        match payment.status {
            PaymentStatus::Completed => {
                summary.completed_count += 1;
                summary.gross_usd_minor += payment.amount_usd_minor;
                summary.gross_usdc_minor += payment.amount_usdc_minor;
            }
            PaymentStatus::Failed | PaymentStatus::Cancelled => summary.failed_count += 1,
            PaymentStatus::Pending => {}
        }
        match payment.payout_status {
            PayoutStatus::Completed => summary.payouts_completed += 1,
            PayoutStatus::Initiated | PayoutStatus::Retrying => summary.payouts_in_flight += 1,
            PayoutStatus::Failed => summary.payouts_failed += 1,
            PayoutStatus::Unset => {}
        }
    }

    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PaymentDatabase, StoredPayment};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = PaymentDatabase::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    #[test]
    fn address_validation_matches_evm_format() {
        assert!(validate_address("0x1111111111111111111111111111111111111111").is_ok());
        assert!(validate_address("1111111111111111111111111111111111111111").is_err());
        assert!(validate_address("0x1111").is_err());
        assert!(validate_address("0xZZ11111111111111111111111111111111111111").is_err());
    }

    #[tokio::test]
    async fn register_and_get_wallet() {
        let (state, _dir) = test_state();

        let Json(registered) = register_wallet(
            State(state.clone()),
            Path("seller_1".to_string()),
            Json(RegisterWalletRequest {
                wallet_id: "wal-1".to_string(),
                address: "0x1111111111111111111111111111111111111111".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(registered.wallet_id, "wal-1");

        let Json(fetched) = get_wallet(State(state), Path("seller_1".to_string()))
            .await
            .unwrap();
        assert_eq!(
            fetched.address,
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[tokio::test]
    async fn missing_wallet_is_not_found() {
        let (state, _dir) = test_state();
        let err = get_wallet(State(state), Path("seller_1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summary_counts_only_completed_revenue() {
        let (state, _dir) = test_state();

        let completed = StoredPayment::new_completed(
            "pay-1".to_string(),
            "pi_1".to_string(),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            None,
            2999,
            29_990_000,
            "usd".to_string(),
        );
        state.db.create_payment(&completed).unwrap();

        let mut failed = StoredPayment::new_pending(
            "pay-2".to_string(),
            Some("pi_2".to_string()),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            None,
            2999,
            29_990_000,
            "usd".to_string(),
        );
        failed.mark_charge_outcome(PaymentStatus::Failed, Some("card_declined".to_string()));
        state.db.create_payment(&failed).unwrap();

        let Json(summary) = seller_summary(State(state), Path("seller_1".to_string()))
            .await
            .unwrap();
        assert_eq!(summary.payment_count, 2);
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.gross_usd_minor, 2999);
        assert_eq!(summary.gross_usdc_minor, 29_990_000);
        assert_eq!(summary.payouts_completed, 0);
    }
}
