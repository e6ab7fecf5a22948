// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Circle wallet integration for USDC payouts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use super::{
    CreateTransferRequest, PayoutProvider, ProviderError, TransferExecution,
    TransferExecutionStatus, TransferStatusDetails,
};

const DEFAULT_API_BASE_URL: &str = "https://api.circle.com";

/// Transfers that have not settled within this window are treated as failed
/// calls; no payment mutation happens and the request is safe to retry.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CircleClient {
    api_base_url: String,
    api_key: String,
    http: Client,
}

impl CircleClient {
    pub fn is_configured() -> bool {
        env_optional("WALLET_PROVIDER_API_KEY").is_some()
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        let api_base_url = env_or_default("WALLET_PROVIDER_BASE_URL", DEFAULT_API_BASE_URL);
        let api_key = env_optional("WALLET_PROVIDER_API_KEY")
            .ok_or_else(|| ProviderError::MissingConfig("WALLET_PROVIDER_API_KEY".to_string()))?;

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url,
            api_key,
            http,
        })
    }

    async fn post_json(
        &self,
        path: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(format!(
                "{}{}",
                self.api_base_url.trim_end_matches('/'),
                path
            ))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("POST {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "POST {path} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("POST {path} invalid JSON: {e}")))
    }

    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(format!(
                "{}{}",
                self.api_base_url.trim_end_matches('/'),
                path
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("GET {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "GET {path} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("GET {path} invalid JSON: {e}")))
    }
}

#[async_trait]
impl PayoutProvider for CircleClient {
    async fn create_transfer(
        &self,
        request: CreateTransferRequest<'_>,
    ) -> Result<TransferExecution, ProviderError> {
        let payload = json!({
            "idempotencyKey": request.idempotency_key,
            "source": {
                "type": "wallet",
                "id": request.wallet_id
            },
            "destination": {
                "type": "blockchain",
                "address": request.destination_address,
                "chain": "BASE"
            },
            "amount": {
                "amount": format_usdc_amount(request.amount_usdc_minor),
                "currency": request.currency
            }
        });

        info!(
            idempotency_key = %request.idempotency_key,
            wallet_id = %request.wallet_id,
            "Circle create_transfer: sending transfer request"
        );

        let response = self
            .post_json("/v1/transfers", &payload, request.idempotency_key)
            .await?;

        let transaction_id = extract_transfer_id(&response)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing transfer id in response".to_string())
            })?
            .to_string();

        // Some create responses omit the status field; treat those as
        // pending and rely on fetch_transfer() polling.
        let status = extract_transfer_status(&response).unwrap_or("pending");

        Ok(TransferExecution {
            transaction_id,
            status: map_transfer_status(status),
        })
    }

    async fn fetch_transfer(
        &self,
        transaction_id: &str,
    ) -> Result<TransferStatusDetails, ProviderError> {
        let response = self
            .get_json(&format!("/v1/transfers/{transaction_id}"))
            .await?;

        let status = extract_transfer_status(&response).ok_or_else(|| {
            ProviderError::InvalidResponse("missing transfer status in response".to_string())
        })?;

        Ok(TransferStatusDetails {
            status: map_transfer_status(status),
            raw_status: status.to_string(),
            failure_reason: response
                .pointer("/data/errorCode")
                .or_else(|| response.get("errorCode"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Render USDC minor units (6 decimal places) as the decimal string the
/// provider API expects.
pub fn format_usdc_amount(amount_usdc_minor: u64) -> String {
    format!(
        "{}.{:06}",
        amount_usdc_minor / 1_000_000,
        amount_usdc_minor % 1_000_000
    )
}

pub fn map_transfer_status(raw_status: &str) -> TransferExecutionStatus {
    let status = raw_status.trim().to_ascii_lowercase();
    match status.as_str() {
        "complete" | "completed" | "confirmed" => TransferExecutionStatus::Completed,
        "failed" | "cancelled" | "denied" => TransferExecutionStatus::Failed,
        _ => TransferExecutionStatus::Pending,
    }
}

fn extract_transfer_id(response: &Value) -> Option<&str> {
    response
        .pointer("/data/id")
        .and_then(Value::as_str)
        .or_else(|| response.get("id").and_then(Value::as_str))
}

fn extract_transfer_status(response: &Value) -> Option<&str> {
    response
        .pointer("/data/status")
        .and_then(Value::as_str)
        .or_else(|| response.get("status").and_then(Value::as_str))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
