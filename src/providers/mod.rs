// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! External provider clients: Stripe (card processor) and the wallet
//! provider that executes USDC transfers.
//!
//! The wallet provider sits behind the [`PayoutProvider`] trait so the
//! reconciler and payout service take test doubles instead of a live
//! HTTP client.

pub mod circle;
#[cfg(test)]
pub mod mock;
pub mod stripe;

use async_trait::async_trait;

pub use circle::CircleClient;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("wallet provider configuration missing: {0}")]
    MissingConfig(String),

    #[error("wallet provider request failed: {0}")]
    Request(String),

    #[error("wallet provider response was invalid: {0}")]
    InvalidResponse(String),
}

/// Coarse transfer status as reported by the wallet provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferExecutionStatus {
    Pending,
    Completed,
    Failed,
}

/// Result of a transfer-creation call.
#[derive(Debug, Clone)]
pub struct TransferExecution {
    /// Provider-side transaction id.
    pub transaction_id: String,
    pub status: TransferExecutionStatus,
}

/// Current state of a previously-created transfer.
#[derive(Debug, Clone)]
pub struct TransferStatusDetails {
    pub status: TransferExecutionStatus,
    /// Raw provider status string, for logging.
    pub raw_status: String,
    pub failure_reason: Option<String>,
}

/// Transfer-creation request.
pub struct CreateTransferRequest<'a> {
    /// Stable key so a repeated request cannot double-transfer on the
    /// provider side.
    pub idempotency_key: &'a str,
    /// Seller's wallet id at the provider.
    pub wallet_id: &'a str,
    /// On-chain destination address.
    pub destination_address: &'a str,
    /// Amount in USDC minor units (6 decimal places).
    pub amount_usdc_minor: u64,
    /// Token symbol, e.g. `USDC`.
    pub currency: &'a str,
}

/// Seam between the payout flow and the wallet provider.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    async fn create_transfer(
        &self,
        request: CreateTransferRequest<'_>,
    ) -> Result<TransferExecution, ProviderError>;

    async fn fetch_transfer(
        &self,
        transaction_id: &str,
    ) -> Result<TransferStatusDetails, ProviderError>;
}
