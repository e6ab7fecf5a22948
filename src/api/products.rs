// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Product endpoints: payment-link CRUD for sellers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::ApiError,
    state::AppState,
    storage::{ProductStatus, StoreError, StoredProduct},
};

use super::payments::parse_usd_to_minor;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to create a product with a payment link.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub seller_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Card price as a decimal string, e.g. "29.99".
    pub price_usd: String,
    /// Payout price as a decimal string with up to 6 decimals; defaults to
    /// the USD price when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usdc: Option<String>,
    /// Payment-link slug (lowercase letters, digits, `-`, `_`).
    pub payment_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to flip a product's active flag.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProductStatusRequest {
    pub active: bool,
}

/// Product returned to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductResponse {
    pub product_id: String,
    pub seller_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Card price as a decimal string.
    pub price_usd: String,
    /// Payout price as a decimal string.
    pub price_usdc: String,
    pub payment_link: String,
    /// Derived from the active flag and expiry.
    pub status: ProductStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// List response for products.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
    pub total: usize,
}

/// Query params for listing products.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ProductListQuery {
    /// Seller whose products to list.
    pub seller_id: String,
}

fn to_response(product: &StoredProduct) -> ProductResponse {
    ProductResponse {
        product_id: product.product_id.clone(),
        seller_id: product.seller_id.clone(),
        name: product.name.clone(),
        description: product.description.clone(),
        price_usd: format_usd(product.price_usd_minor),
        price_usdc: format_usdc(product.price_usdc_minor),
        payment_link: product.payment_link.clone(),
        status: product.status_at(Utc::now()),
        expires_at: product.expires_at.map(|t| t.to_rfc3339()),
        created_at: product.created_at.to_rfc3339(),
        updated_at: product.updated_at.to_rfc3339(),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn format_usd(minor: u64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

fn format_usdc(minor: u64) -> String {
    format!("{}.{:06}", minor / 1_000_000, minor % 1_000_000)
}

/// Parse a decimal USDC string (max 6 decimal places) into minor units.
fn parse_usdc_to_minor(amount: &str) -> Result<u64, ApiError> {
    let trimmed = amount.trim();
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() > 2 || parts[0].is_empty() || !parts[0].chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::bad_request(
            "price_usdc must be a valid positive number",
        ));
    }

    let whole = parts[0]
        .parse::<u64>()
        .map_err(|_| ApiError::bad_request("price_usdc is too large"))?;

    let fraction_part = if parts.len() == 2 { parts[1] } else { "" };
    if !fraction_part.chars().all(|c| c.is_ascii_digit()) || fraction_part.len() > 6 {
        return Err(ApiError::bad_request(
            "price_usdc must have at most 6 decimal places",
        ));
    }
    let mut fraction = fraction_part
        .parse::<u64>()
        .unwrap_or(0);
    for _ in fraction_part.len()..6 {
        fraction *= 10;
    }

    let minor = whole
        .checked_mul(1_000_000)
        .and_then(|base| base.checked_add(fraction))
        .ok_or_else(|| ApiError::bad_request("price_usdc is too large"))?;

    if minor == 0 {
        return Err(ApiError::bad_request(
            "price_usdc must be a valid positive number",
        ));
    }
    Ok(minor)
}

fn validate_payment_link(slug: &str) -> Result<(), ApiError> {
    if slug.is_empty() || slug.len() > 64 {
        return Err(ApiError::bad_request(
            "payment_link must be 1-64 characters",
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ApiError::bad_request(
            "payment_link may only contain lowercase letters, digits, `-` and `_`",
        ));
    }
    Ok(())
}

fn store_error(error: StoreError) -> ApiError {
    match error {
        StoreError::NotFound(message) => ApiError::not_found(message),
        StoreError::AlreadyExists(message) => ApiError::conflict(message),
        other => ApiError::internal(format!("Storage failure: {other}")),
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a product with a payment link.
#[utoipa::path(
    post,
    path = "/v1/products",
    tag = "Products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Bad request"),
        (status = 409, description = "Payment link already in use")
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let seller_id = request.seller_id.trim();
    if seller_id.is_empty() {
        return Err(ApiError::bad_request("seller_id must not be empty"));
    }
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }
    let payment_link = request.payment_link.trim();
    validate_payment_link(payment_link)?;

    let price_usd_minor = parse_usd_to_minor(&request.price_usd)?;
    let price_usdc_minor = match request.price_usdc.as_deref() {
        Some(value) => parse_usdc_to_minor(value)?,
        // 2-decimal fiat minor units → 6-decimal token minor units.
        None => price_usd_minor * 10_000,
    };

    let product = StoredProduct::new(
        uuid::Uuid::new_v4().to_string(),
        seller_id.to_string(),
        name.to_string(),
        request
            .description
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        price_usd_minor,
        price_usdc_minor,
        payment_link.to_string(),
        request.expires_at,
    );

    state.db.create_product(&product).map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(to_response(&product))))
}

/// Get product by ID.
#[utoipa::path(
    get,
    path = "/v1/products/{product_id}",
    tag = "Products",
    params(("product_id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product details", body = ProductResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .db
        .get_product(&product_id)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    Ok(Json(to_response(&product)))
}

/// Get product by payment-link slug (the buyer-facing lookup).
#[utoipa::path(
    get,
    path = "/v1/products/link/{payment_link}",
    tag = "Products",
    params(("payment_link" = String, Path, description = "Payment-link slug")),
    responses(
        (status = 200, description = "Product details", body = ProductResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_product_by_link(
    State(state): State<AppState>,
    Path(payment_link): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .db
        .get_product_by_link(&payment_link)
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("Payment link not found"))?;
    Ok(Json(to_response(&product)))
}

/// List a seller's products, newest first.
#[utoipa::path(
    get,
    path = "/v1/products",
    tag = "Products",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Products listed", body = ProductListResponse)
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let products = state
        .db
        .list_products_by_seller(&query.seller_id)
        .map_err(store_error)?;
    let mapped: Vec<ProductResponse> = products.iter().map(to_response).collect();
    Ok(Json(ProductListResponse {
        total: mapped.len(),
        products: mapped,
    }))
}

/// Activate or deactivate a product.
#[utoipa::path(
    put,
    path = "/v1/products/{product_id}/status",
    tag = "Products",
    params(("product_id" = String, Path, description = "Product ID")),
    request_body = UpdateProductStatusRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_product_status(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(request): Json<UpdateProductStatusRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .db
        .set_product_active(&product_id, request.active)
        .map_err(store_error)?;
    Ok(Json(to_response(&product)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PaymentDatabase;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = PaymentDatabase::open(&dir.path().join("test.redb")).unwrap();
        (AppState::new(db), dir)
    }

    fn demo_request() -> CreateProductRequest {
        CreateProductRequest {
            seller_id: "seller_1".to_string(),
            name: "Demo".to_string(),
            description: None,
            price_usd: "29.99".to_string(),
            price_usdc: None,
            payment_link: "demo".to_string(),
            expires_at: None,
        }
    }

    #[test]
    fn parse_usdc_handles_partial_decimals() {
        assert_eq!(parse_usdc_to_minor("29.99").unwrap(), 29_990_000);
        assert_eq!(parse_usdc_to_minor("29.990000").unwrap(), 29_990_000);
        assert_eq!(parse_usdc_to_minor("0.000001").unwrap(), 1);
        assert_eq!(parse_usdc_to_minor("100").unwrap(), 100_000_000);
    }

    #[test]
    fn parse_usdc_rejects_invalid_values() {
        assert!(parse_usdc_to_minor("0").is_err());
        assert!(parse_usdc_to_minor("1.1234567").is_err());
        assert!(parse_usdc_to_minor("x").is_err());
    }

    #[test]
    fn payment_link_charset_is_enforced() {
        assert!(validate_payment_link("demo-link_2").is_ok());
        assert!(validate_payment_link("").is_err());
        assert!(validate_payment_link("Has Spaces").is_err());
        assert!(validate_payment_link("UPPER").is_err());
    }

    #[tokio::test]
    async fn create_defaults_usdc_price_to_usd() {
        let (state, _dir) = test_state();
        let (status, Json(response)) = create_product(State(state), Json(demo_request()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.price_usd, "29.99");
        assert_eq!(response.price_usdc, "29.990000");
        assert_eq!(response.status, ProductStatus::Active);
    }

    #[tokio::test]
    async fn duplicate_payment_link_conflicts() {
        let (state, _dir) = test_state();
        create_product(State(state.clone()), Json(demo_request()))
            .await
            .unwrap();
        let err = create_product(State(state), Json(demo_request()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn status_update_flips_active_flag() {
        let (state, _dir) = test_state();
        let (_, Json(created)) = create_product(State(state.clone()), Json(demo_request()))
            .await
            .unwrap();

        let Json(updated) = update_product_status(
            State(state),
            Path(created.product_id.clone()),
            Json(UpdateProductStatusRequest { active: false }),
        )
        .await
        .unwrap();
        assert_eq!(updated.status, ProductStatus::Inactive);
    }

    #[tokio::test]
    async fn buyer_lookup_by_link_works() {
        let (state, _dir) = test_state();
        create_product(State(state.clone()), Json(demo_request()))
            .await
            .unwrap();

        let Json(found) = get_product_by_link(State(state), Path("demo".to_string()))
            .await
            .unwrap();
        assert_eq!(found.payment_link, "demo");
    }
}
