// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Seller wallet registration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A seller's registered payout destination.
///
/// Payouts require both the provider-side wallet id and the on-chain
/// address; a seller without this record cannot receive a payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerWallet {
    pub seller_id: String,
    /// Wallet id at the wallet provider.
    pub wallet_id: String,
    /// On-chain USDC destination address.
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerWallet {
    pub fn new(seller_id: String, wallet_id: String, address: String) -> Self {
        let now = Utc::now();
        Self {
            seller_id,
            wallet_id,
            address,
            created_at: now,
            updated_at: now,
        }
    }
}
