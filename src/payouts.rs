// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Payout initiation, manual retry, and provider-status refresh.
//!
//! Every operation validates its preconditions before the wallet provider
//! is contacted, and the persisting write transaction re-validates them, so
//! a racing request can neither double-transfer nor clobber a settled
//! payout. Provider failures leave the payment's payout fields untouched;
//! the operation stays safely retryable.

use tracing::{info, warn};

use crate::providers::{
    CreateTransferRequest, PayoutProvider, ProviderError, TransferExecutionStatus,
};
use crate::storage::{
    PaymentDatabase, PaymentStatus, PayoutStatus, StoreError, StoredPayment,
};

const DEFAULT_PAYOUT_CURRENCY: &str = "USDC";

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("payment {0} not found")]
    PaymentNotFound(String),

    #[error("payment {0} is not completed")]
    PaymentNotCompleted(String),

    #[error("payout for payment {0} is already in progress or completed")]
    AlreadyInProgress(String),

    #[error("payout for payment {0} is already completed")]
    AlreadyCompleted(String),

    #[error("seller {0} has no payout wallet configured")]
    WalletNotConfigured(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn payout_currency() -> String {
    std::env::var("PAYOUT_CURRENCY")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PAYOUT_CURRENCY.to_string())
}

/// Request the first USDC transfer for a completed payment.
pub async fn initiate(
    db: &PaymentDatabase,
    provider: &dyn PayoutProvider,
    payment_id: &str,
) -> Result<StoredPayment, PayoutError> {
    let payment = db
        .get_payment(payment_id)?
        .ok_or_else(|| PayoutError::PaymentNotFound(payment_id.to_string()))?;

    if payment.status != PaymentStatus::Completed {
        return Err(PayoutError::PaymentNotCompleted(payment_id.to_string()));
    }
    if !payment.payout_status.can_initiate() {
        return Err(PayoutError::AlreadyInProgress(payment_id.to_string()));
    }

    let idempotency_key = format!("{}-{}", payment.payment_id, payment.payout_retry_count);
    let execution =
        request_transfer(db, provider, &payment, &idempotency_key).await?;

    let updated = db.record_payout_initiated(&payment.payment_id, &execution.transaction_id)?;
    info!(
        payment_id = %updated.payment_id,
        transaction_id = %execution.transaction_id,
        "payout initiated"
    );

    settle_immediate(db, &updated, execution.status)
}

/// Re-request the transfer for a payment whose payout has not settled.
/// Bumps the retry counter by exactly one and replaces the transaction id.
pub async fn retry(
    db: &PaymentDatabase,
    provider: &dyn PayoutProvider,
    payment_id: &str,
    reason: Option<String>,
) -> Result<StoredPayment, PayoutError> {
    let payment = db
        .get_payment(payment_id)?
        .ok_or_else(|| PayoutError::PaymentNotFound(payment_id.to_string()))?;

    if payment.status != PaymentStatus::Completed {
        return Err(PayoutError::PaymentNotCompleted(payment_id.to_string()));
    }
    if !payment.payout_status.can_retry() {
        return Err(PayoutError::AlreadyCompleted(payment_id.to_string()));
    }

    let idempotency_key = format!("{}-{}", payment.payment_id, payment.payout_retry_count + 1);
    let execution =
        request_transfer(db, provider, &payment, &idempotency_key).await?;

    let updated =
        db.record_payout_retry(&payment.payment_id, &execution.transaction_id, reason)?;
    info!(
        payment_id = %updated.payment_id,
        transaction_id = %execution.transaction_id,
        retry_count = updated.payout_retry_count,
        "payout retried"
    );

    settle_immediate(db, &updated, execution.status)
}

/// Poll the provider for an in-flight transfer and conditionally settle the
/// payout. Provider errors are logged and skipped; the record is returned
/// unchanged so a read path never fails because the provider is down.
pub async fn refresh(
    db: &PaymentDatabase,
    provider: &dyn PayoutProvider,
    payment_id: &str,
) -> Result<StoredPayment, PayoutError> {
    let payment = db
        .get_payment(payment_id)?
        .ok_or_else(|| PayoutError::PaymentNotFound(payment_id.to_string()))?;

    if !payment.payout_status.in_flight() {
        return Ok(payment);
    }
    let Some(transaction_id) = payment.payout_transaction_id.clone() else {
        return Ok(payment);
    };

    let details = match provider.fetch_transfer(&transaction_id).await {
        Ok(details) => details,
        Err(error) => {
            warn!(
                payment_id = %payment.payment_id,
                transaction_id = %transaction_id,
                error = %error,
                "failed to refresh payout status from provider"
            );
            return Ok(payment);
        }
    };

    match details.status {
        TransferExecutionStatus::Completed => {
            Ok(db.settle_payout(&payment.payment_id, PayoutStatus::Completed, None)?)
        }
        TransferExecutionStatus::Failed => {
            let reason = details
                .failure_reason
                .unwrap_or_else(|| details.raw_status.clone());
            Ok(db.settle_payout(&payment.payment_id, PayoutStatus::Failed, Some(reason))?)
        }
        TransferExecutionStatus::Pending => Ok(payment),
    }
}

async fn request_transfer(
    db: &PaymentDatabase,
    provider: &dyn PayoutProvider,
    payment: &StoredPayment,
    idempotency_key: &str,
) -> Result<crate::providers::TransferExecution, PayoutError> {
    let wallet = db
        .get_seller_wallet(&payment.seller_id)?
        .ok_or_else(|| PayoutError::WalletNotConfigured(payment.seller_id.clone()))?;

    let currency = payout_currency();
    let execution = provider
        .create_transfer(CreateTransferRequest {
            idempotency_key,
            wallet_id: &wallet.wallet_id,
            destination_address: &wallet.address,
            amount_usdc_minor: payment.amount_usdc_minor,
            currency: &currency,
        })
        .await?;
    Ok(execution)
}

/// Providers occasionally report a terminal status directly on the create
/// response; fold it in instead of waiting for a refresh.
fn settle_immediate(
    db: &PaymentDatabase,
    payment: &StoredPayment,
    status: TransferExecutionStatus,
) -> Result<StoredPayment, PayoutError> {
    match status {
        TransferExecutionStatus::Completed => {
            Ok(db.settle_payout(&payment.payment_id, PayoutStatus::Completed, None)?)
        }
        TransferExecutionStatus::Failed => Ok(db.settle_payout(
            &payment.payment_id,
            PayoutStatus::Failed,
            Some("transfer failed on creation".to_string()),
        )?),
        TransferExecutionStatus::Pending => Ok(payment.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::RecordingProvider;
    use crate::providers::TransferStatusDetails;
    use crate::storage::{SellerWallet, StoredPayment};

    fn temp_db() -> (PaymentDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = PaymentDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed_wallet(db: &PaymentDatabase) {
        db.put_seller_wallet(&SellerWallet::new(
            "seller_1".to_string(),
            "wal-1".to_string(),
            "0x1111111111111111111111111111111111111111".to_string(),
        ))
        .unwrap();
    }

    fn seed_completed_payment(db: &PaymentDatabase, payment_id: &str) {
        let payment = StoredPayment::new_completed(
            payment_id.to_string(),
            format!("pi_{payment_id}"),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            None,
            2999,
            29_990_000,
            "usd".to_string(),
        );
        db.create_payment(&payment).unwrap();
    }

    fn seed_pending_payment(db: &PaymentDatabase, payment_id: &str) {
        let payment = StoredPayment::new_pending(
            payment_id.to_string(),
            Some(format!("pi_{payment_id}")),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            None,
            2999,
            29_990_000,
            "usd".to_string(),
        );
        db.create_payment(&payment).unwrap();
    }

    #[tokio::test]
    async fn initiate_records_transaction_and_status() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        let payment = initiate(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Initiated);
        assert_eq!(payment.payout_transaction_id.as_deref(), Some("tx-1"));
        assert!(payment.payout_initiated_at.is_some());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_key().as_deref(), Some("pay-1-0"));
    }

    #[tokio::test]
    async fn initiate_rejects_non_completed_payment_without_provider_call() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_pending_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        let err = initiate(&db, &provider, "pay-1").await.unwrap_err();
        assert!(matches!(err, PayoutError::PaymentNotCompleted(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn initiate_requires_registered_wallet() {
        let (db, _dir) = temp_db();
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        let err = initiate(&db, &provider, "pay-1").await.unwrap_err();
        assert!(matches!(err, PayoutError::WalletNotConfigured(_)));
        assert_eq!(provider.call_count(), 0);

        let payment = db.get_payment("pay-1").unwrap().unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
    }

    #[tokio::test]
    async fn double_initiate_fails_without_second_provider_call() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        initiate(&db, &provider, "pay-1").await.unwrap();
        let err = initiate(&db, &provider, "pay-1").await.unwrap_err();
        assert!(matches!(err, PayoutError::AlreadyInProgress(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_leaves_payout_fields_untouched() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::failing();

        let err = initiate(&db, &provider, "pay-1").await.unwrap_err();
        assert!(matches!(err, PayoutError::Provider(_)));

        let payment = db.get_payment("pay-1").unwrap().unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
        assert!(payment.payout_transaction_id.is_none());

        // The failed attempt is retryable.
        let healthy = RecordingProvider::new();
        let payment = initiate(&db, &healthy, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Initiated);
    }

    #[tokio::test]
    async fn retry_bumps_count_and_replaces_transaction_id() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        initiate(&db, &provider, "pay-1").await.unwrap();
        let retried = retry(&db, &provider, "pay-1", Some("stuck on chain".to_string()))
            .await
            .unwrap();
        assert_eq!(retried.payout_status, PayoutStatus::Retrying);
        assert_eq!(retried.payout_retry_count, 1);
        assert_eq!(retried.payout_transaction_id.as_deref(), Some("tx-2"));
        assert_eq!(retried.payout_retry_reason.as_deref(), Some("stuck on chain"));
        assert!(retried.payout_retried_at.is_some());
        assert_eq!(provider.last_key().as_deref(), Some("pay-1-1"));

        let again = retry(&db, &provider, "pay-1", None).await.unwrap();
        assert_eq!(again.payout_retry_count, 2);
        assert_eq!(again.payout_transaction_id.as_deref(), Some("tx-3"));
        assert_eq!(provider.last_key().as_deref(), Some("pay-1-2"));
    }

    #[tokio::test]
    async fn retry_rejected_once_payout_completed() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        initiate(&db, &provider, "pay-1").await.unwrap();
        db.settle_payout("pay-1", PayoutStatus::Completed, None)
            .unwrap();

        let err = retry(&db, &provider, "pay-1", None).await.unwrap_err();
        assert!(matches!(err, PayoutError::AlreadyCompleted(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn retry_rejects_non_completed_payment() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_pending_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        let err = retry(&db, &provider, "pay-1", None).await.unwrap_err();
        assert!(matches!(err, PayoutError::PaymentNotCompleted(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn refresh_settles_completed_transfer() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();
        initiate(&db, &provider, "pay-1").await.unwrap();

        provider.set_fetch_result(TransferStatusDetails {
            status: TransferExecutionStatus::Completed,
            raw_status: "complete".to_string(),
            failure_reason: None,
        });
        let payment = refresh(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Completed);
    }

    #[tokio::test]
    async fn refresh_records_provider_failure_reason() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();
        initiate(&db, &provider, "pay-1").await.unwrap();

        provider.set_fetch_result(TransferStatusDetails {
            status: TransferExecutionStatus::Failed,
            raw_status: "failed".to_string(),
            failure_reason: Some("insufficient_funds".to_string()),
        });
        let payment = refresh(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Failed);
        assert_eq!(
            payment.payout_failure_reason.as_deref(),
            Some("insufficient_funds")
        );

        // Failed payouts can be retried.
        let retried = retry(&db, &provider, "pay-1", None).await.unwrap();
        assert_eq!(retried.payout_status, PayoutStatus::Retrying);
    }

    #[tokio::test]
    async fn refresh_skips_when_provider_is_down() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();
        initiate(&db, &provider, "pay-1").await.unwrap();

        // No canned fetch result: the provider call fails.
        let payment = refresh(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Initiated);
    }

    #[tokio::test]
    async fn refresh_is_a_noop_without_transfer_in_flight() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider = RecordingProvider::new();

        let payment = refresh(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
    }

    #[tokio::test]
    async fn immediately_completed_transfer_settles_on_initiate() {
        let (db, _dir) = temp_db();
        seed_wallet(&db);
        seed_completed_payment(&db, "pay-1");
        let provider =
            RecordingProvider::with_create_status(TransferExecutionStatus::Completed);

        let payment = initiate(&db, &provider, "pay-1").await.unwrap();
        assert_eq!(payment.payout_status, PayoutStatus::Completed);
    }
}
