// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Product record for sellable payment links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Purchasability, derived from the `active` flag and optional expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
    Expired,
}

/// Persisted product record.
///
/// `price_usdc_minor` is the authoritative payout amount: the reconciler
/// converts a charge into a payout using this stored price, never by
/// re-deriving from the fiat amount the processor reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProduct {
    /// Unique product identifier (UUID).
    pub product_id: String,
    /// Seller who owns the product.
    pub seller_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Card price in fiat minor units (cents).
    pub price_usd_minor: u64,
    /// Payout price in USDC minor units (6 decimal places).
    pub price_usdc_minor: u64,
    /// Payment-link slug; unique across products.
    pub payment_link: String,
    /// Seller-controlled on/off switch.
    pub active: bool,
    /// Optional expiry; past this instant the product is not purchasable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredProduct {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: String,
        seller_id: String,
        name: String,
        description: Option<String>,
        price_usd_minor: u64,
        price_usdc_minor: u64,
        payment_link: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            product_id,
            seller_id,
            name,
            description,
            price_usd_minor,
            price_usdc_minor,
            payment_link,
            active: true,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived status at `now`.
    pub fn status_at(&self, now: DateTime<Utc>) -> ProductStatus {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return ProductStatus::Expired;
            }
        }
        if self.active {
            ProductStatus::Active
        } else {
            ProductStatus::Inactive
        }
    }

    /// Whether a new checkout may be started against this product.
    pub fn purchasable_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == ProductStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> StoredProduct {
        StoredProduct::new(
            "prod-1".to_string(),
            "seller_1".to_string(),
            "Demo".to_string(),
            None,
            2999,
            29_990_000,
            "demo".to_string(),
            None,
        )
    }

    #[test]
    fn new_product_is_active() {
        let product = sample();
        assert_eq!(product.status_at(Utc::now()), ProductStatus::Active);
        assert!(product.purchasable_at(Utc::now()));
    }

    #[test]
    fn deactivated_product_is_inactive() {
        let mut product = sample();
        product.active = false;
        assert_eq!(product.status_at(Utc::now()), ProductStatus::Inactive);
        assert!(!product.purchasable_at(Utc::now()));
    }

    #[test]
    fn expiry_wins_over_active_flag() {
        let mut product = sample();
        product.expires_at = Some(Utc::now() - Duration::hours(1));
        assert_eq!(product.status_at(Utc::now()), ProductStatus::Expired);

        product.active = false;
        assert_eq!(product.status_at(Utc::now()), ProductStatus::Expired);
    }

    #[test]
    fn future_expiry_keeps_product_active() {
        let mut product = sample();
        product.expires_at = Some(Utc::now() + Duration::hours(1));
        assert_eq!(product.status_at(Utc::now()), ProductStatus::Active);
    }
}
