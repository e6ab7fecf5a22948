// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Payment reconciliation: turns verified processor events into durable
//! payment records and triggers the payout exactly once per charge.
//!
//! The find-or-create step is keyed by the processor's payment-intent id
//! through one atomic storage operation, so redelivered events (and racing
//! deliveries of the same event) produce exactly one record and exactly one
//! payout initiation.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::payouts;
use crate::providers::stripe::{CheckoutSession, PaymentIntent, WebhookEvent};
use crate::providers::PayoutProvider;
use crate::storage::{PaymentDatabase, PaymentStatus, StoreError, StoredPayment};

/// Metadata key carrying the payment-link slug on processor objects.
pub const METADATA_LINK_KEY: &str = "linkSlug";
/// Metadata key carrying the buyer identity, when the checkout sets one.
pub const METADATA_BUYER_KEY: &str = "buyerId";

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The charge carries no payment-link metadata and no payment record
    /// exists; it cannot be attributed to a seller.
    #[error("charge {0} carries no payment-link metadata")]
    MissingLinkMetadata(String),

    /// The charge references a payment link no product matches.
    #[error("charge {intent_id} references unknown payment link `{payment_link}`")]
    UnknownProduct {
        intent_id: String,
        payment_link: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Dispatch a verified webhook event.
///
/// `provider` is `None` when the wallet provider is unconfigured; completed
/// payments are still recorded and the payout is left for manual initiation.
pub async fn handle_event(
    db: &PaymentDatabase,
    provider: Option<&dyn PayoutProvider>,
    event: WebhookEvent,
) -> Result<(), ReconcileError> {
    match event {
        WebhookEvent::PaymentSucceeded(intent) => {
            complete_charge(
                db,
                provider,
                &intent.id,
                Some(intent.amount),
                non_empty(&intent.currency),
                &intent.metadata,
            )
            .await
        }
        WebhookEvent::PaymentFailed(intent) => {
            record_charge_outcome(db, &intent, PaymentStatus::Failed)
        }
        WebhookEvent::PaymentCanceled(intent) => {
            record_charge_outcome(db, &intent, PaymentStatus::Cancelled)
        }
        WebhookEvent::CheckoutCompleted(session) => {
            checkout_completed(db, provider, session).await
        }
        WebhookEvent::Other { event_type } => {
            debug!(event_type = %event_type, "ignoring unhandled webhook event");
            Ok(())
        }
    }
}

async fn complete_charge(
    db: &PaymentDatabase,
    provider: Option<&dyn PayoutProvider>,
    intent_id: &str,
    amount_usd_minor: Option<u64>,
    currency: Option<&str>,
    metadata: &HashMap<String, String>,
) -> Result<(), ReconcileError> {
    // Only a first-seen intent needs a candidate record, and only building
    // one needs the product lookup. The atomic completion step below makes
    // the existence probe race-free: a candidate racing a concurrent create
    // is simply discarded.
    let candidate = if db.get_payment_by_intent(intent_id)?.is_some() {
        None
    } else {
        Some(build_candidate(
            db,
            intent_id,
            amount_usd_minor,
            currency,
            metadata,
        )?)
    };

    let outcome = db.complete_payment_by_intent(intent_id, candidate)?;
    let payment = outcome.payment().clone();

    if !outcome.first_completion() {
        info!(
            payment_id = %payment.payment_id,
            intent_id = %intent_id,
            "charge already reconciled; ignoring redelivery"
        );
        return Ok(());
    }

    info!(
        payment_id = %payment.payment_id,
        intent_id = %intent_id,
        seller_id = %payment.seller_id,
        amount_usdc_minor = payment.amount_usdc_minor,
        "payment completed"
    );

    // A successful charge is final; payout failure is surfaced for manual
    // retry, never rolled back into the payment status.
    match provider {
        Some(provider) => {
            if let Err(error) = payouts::initiate(db, provider, &payment.payment_id).await {
                warn!(
                    payment_id = %payment.payment_id,
                    error = %error,
                    "payout initiation failed; manual retry required"
                );
            }
        }
        None => {
            warn!(
                payment_id = %payment.payment_id,
                "wallet provider not configured; payout left for manual initiation"
            );
        }
    }

    Ok(())
}

/// Build the completed payment for a first-seen charge. The USDC amount
/// comes from the product's stored price, never from converting the fiat
/// amount the processor reported.
fn build_candidate(
    db: &PaymentDatabase,
    intent_id: &str,
    amount_usd_minor: Option<u64>,
    currency: Option<&str>,
    metadata: &HashMap<String, String>,
) -> Result<StoredPayment, ReconcileError> {
    let payment_link = metadata
        .get(METADATA_LINK_KEY)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ReconcileError::MissingLinkMetadata(intent_id.to_string()))?;

    let product = db
        .get_product_by_link(payment_link)?
        .ok_or_else(|| ReconcileError::UnknownProduct {
            intent_id: intent_id.to_string(),
            payment_link: payment_link.to_string(),
        })?;

    Ok(StoredPayment::new_completed(
        Uuid::new_v4().to_string(),
        intent_id.to_string(),
        product.product_id.clone(),
        product.payment_link.clone(),
        product.seller_id.clone(),
        metadata.get(METADATA_BUYER_KEY).cloned(),
        amount_usd_minor.unwrap_or(product.price_usd_minor),
        product.price_usdc_minor,
        currency.unwrap_or("usd").to_ascii_lowercase(),
    ))
}

fn record_charge_outcome(
    db: &PaymentDatabase,
    intent: &PaymentIntent,
    status: PaymentStatus,
) -> Result<(), ReconcileError> {
    let reason = intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.clone());

    match db.record_charge_outcome_by_intent(&intent.id, status, reason)? {
        Some(payment) => {
            info!(
                payment_id = %payment.payment_id,
                intent_id = %intent.id,
                status = ?payment.status,
                "charge outcome recorded"
            );
        }
        None => {
            debug!(
                intent_id = %intent.id,
                "charge outcome for unknown payment intent ignored"
            );
        }
    }
    Ok(())
}

async fn checkout_completed(
    db: &PaymentDatabase,
    provider: Option<&dyn PayoutProvider>,
    session: CheckoutSession,
) -> Result<(), ReconcileError> {
    let Some(intent_id) = session.payment_intent.as_deref() else {
        debug!(
            session_id = %session.id,
            "checkout session without payment intent ignored"
        );
        return Ok(());
    };

    complete_charge(
        db,
        provider,
        intent_id,
        session.amount_total,
        None,
        &session.metadata,
    )
    .await
}

fn non_empty(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::RecordingProvider;
    use crate::storage::{PayoutStatus, SellerWallet, StoredProduct};

    fn temp_db() -> (PaymentDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = PaymentDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn seed(db: &PaymentDatabase) {
        db.create_product(&StoredProduct::new(
            "prod-1".to_string(),
            "seller_1".to_string(),
            "Demo".to_string(),
            None,
            2999,
            29_990_000,
            "demo".to_string(),
            None,
        ))
        .unwrap();
        db.put_seller_wallet(&SellerWallet::new(
            "seller_1".to_string(),
            "wal-1".to_string(),
            "0x1111111111111111111111111111111111111111".to_string(),
        ))
        .unwrap();
    }

    fn succeeded_event(intent_id: &str, amount: u64) -> WebhookEvent {
        WebhookEvent::PaymentSucceeded(PaymentIntent {
            id: intent_id.to_string(),
            amount,
            currency: "usd".to_string(),
            metadata: HashMap::from([(METADATA_LINK_KEY.to_string(), "demo".to_string())]),
            last_payment_error: None,
        })
    }

    #[tokio::test]
    async fn duplicate_delivery_creates_one_payment_and_one_payout() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();
        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let listed = db.list_payments_by_seller("seller_1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, PaymentStatus::Completed);
        assert_eq!(listed[0].payout_status, PayoutStatus::Initiated);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn usdc_amount_comes_from_the_product_price() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        // The processor reports a rounded fiat amount; the payout amount is
        // still the product's stored USDC price.
        handle_event(&db, Some(&provider), succeeded_event("pi_1", 3000))
            .await
            .unwrap();

        let payment = db.get_payment_by_intent("pi_1").unwrap().unwrap();
        assert_eq!(payment.amount_usd_minor, 3000);
        assert_eq!(payment.amount_usdc_minor, 29_990_000);
        assert_eq!(payment.seller_id, "seller_1");
        assert_eq!(payment.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn orphan_charge_without_link_metadata_is_rejected() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        let event = WebhookEvent::PaymentSucceeded(PaymentIntent {
            id: "pi_orphan".to_string(),
            amount: 2999,
            currency: "usd".to_string(),
            metadata: HashMap::new(),
            last_payment_error: None,
        });
        let err = handle_event(&db, Some(&provider), event).await.unwrap_err();
        assert!(matches!(err, ReconcileError::MissingLinkMetadata(_)));
        assert!(db.get_payment_by_intent("pi_orphan").unwrap().is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unknown_payment_link_is_rejected() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        let event = WebhookEvent::PaymentSucceeded(PaymentIntent {
            id: "pi_ghost".to_string(),
            amount: 2999,
            currency: "usd".to_string(),
            metadata: HashMap::from([(METADATA_LINK_KEY.to_string(), "nope".to_string())]),
            last_payment_error: None,
        });
        let err = handle_event(&db, Some(&provider), event).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownProduct { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_charge_records_reason_without_payout() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        // Buyer started a checkout, then the card was declined.
        let pending = StoredPayment::new_pending(
            "pay-1".to_string(),
            Some("pi_1".to_string()),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            Some("buyer_1".to_string()),
            2999,
            29_990_000,
            "usd".to_string(),
        );
        db.create_payment(&pending).unwrap();

        let event = WebhookEvent::PaymentFailed(PaymentIntent {
            id: "pi_1".to_string(),
            amount: 2999,
            currency: "usd".to_string(),
            metadata: HashMap::new(),
            last_payment_error: Some(crate::providers::stripe::LastPaymentError {
                message: Some("card_declined".to_string()),
            }),
        });
        handle_event(&db, Some(&provider), event).await.unwrap();

        let payment = db.get_payment("pay-1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.failure_reason.as_deref(), Some("card_declined"));
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_charge_never_regresses_a_completed_payment() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let event = WebhookEvent::PaymentCanceled(PaymentIntent {
            id: "pi_1".to_string(),
            amount: 2999,
            currency: "usd".to_string(),
            metadata: HashMap::new(),
            last_payment_error: None,
        });
        handle_event(&db, Some(&provider), event).await.unwrap();

        let payment = db.get_payment_by_intent("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn payout_failure_keeps_payment_completed() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::failing();

        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let payment = db.get_payment_by_intent("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn pending_checkout_payment_transitions_and_pays_out_once() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        let pending = StoredPayment::new_pending(
            "pay-1".to_string(),
            Some("pi_1".to_string()),
            "prod-1".to_string(),
            "demo".to_string(),
            "seller_1".to_string(),
            None,
            2999,
            29_990_000,
            "usd".to_string(),
        );
        db.create_payment(&pending).unwrap();

        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();
        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let payment = db.get_payment("pay-1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.payout_status, PayoutStatus::Initiated);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn checkout_session_completes_the_same_charge_idempotently() {
        let (db, _dir) = temp_db();
        seed(&db);
        let provider = RecordingProvider::new();

        let session = WebhookEvent::CheckoutCompleted(CheckoutSession {
            id: "cs_1".to_string(),
            payment_intent: Some("pi_1".to_string()),
            amount_total: Some(2999),
            metadata: HashMap::from([(METADATA_LINK_KEY.to_string(), "demo".to_string())]),
        });
        handle_event(&db, Some(&provider), session).await.unwrap();

        // The intent-level event arrives later for the same charge.
        handle_event(&db, Some(&provider), succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let listed = db.list_payments_by_seller("seller_1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_provider_leaves_payout_for_manual_initiation() {
        let (db, _dir) = temp_db();
        seed(&db);

        handle_event(&db, None, succeeded_event("pi_1", 2999))
            .await
            .unwrap();

        let payment = db.get_payment_by_intent("pi_1").unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.payout_status, PayoutStatus::Unset);
    }
}
