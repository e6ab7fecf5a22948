// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Payment record and its status machines.
//!
//! A payment tracks one buyer→seller money movement: the card charge on the
//! Stripe side (`status`) and the USDC settlement on the wallet-provider side
//! (`payout_status`). All payout transitions are validated through
//! [`PayoutStatus::can_transition_to`] so the rules live in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Charge status, set by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Checkout started, charge outcome unknown.
    Pending,
    /// Charge succeeded. Terminal for the charge side; never regressed.
    Completed,
    /// Charge failed (card declined, etc.).
    Failed,
    /// Charge cancelled before completion.
    Cancelled,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Settlement status of the USDC payout for a completed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// No transfer requested yet.
    Unset,
    /// First transfer request accepted by the wallet provider.
    Initiated,
    /// A manual retry replaced the previous transfer attempt.
    Retrying,
    /// Provider confirmed the transfer settled. Terminal.
    Completed,
    /// Provider reported the transfer failed; manual retry is the recovery path.
    Failed,
}

impl Default for PayoutStatus {
    fn default() -> Self {
        Self::Unset
    }
}

impl PayoutStatus {
    /// Single source of truth for the payout state machine.
    ///
    /// `unset → {initiated, retrying}`, `initiated → {completed, retrying,
    /// failed}`, `retrying → {completed, retrying, failed}` (re-entrant),
    /// `failed → {initiated, retrying}`. `completed` is never exited.
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::{Completed, Failed, Initiated, Retrying, Unset};
        match (self, next) {
            (Completed, _) => false,
            (Unset, Initiated | Retrying) => true,
            (Initiated, Completed | Retrying | Failed) => true,
            (Retrying, Completed | Retrying | Failed) => true,
            (Failed, Initiated | Retrying) => true,
            _ => false,
        }
    }

    /// Whether a first transfer request is allowed from this state.
    pub fn can_initiate(self) -> bool {
        self.can_transition_to(PayoutStatus::Initiated)
    }

    /// Whether a manual retry is allowed from this state.
    pub fn can_retry(self) -> bool {
        self.can_transition_to(PayoutStatus::Retrying)
    }

    /// Whether a provider transfer is currently awaiting settlement.
    pub fn in_flight(self) -> bool {
        matches!(self, PayoutStatus::Initiated | PayoutStatus::Retrying)
    }
}

/// Persisted payment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPayment {
    /// Unique payment identifier (UUID).
    pub payment_id: String,
    /// Stripe payment-intent id; unique across payments once assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_payment_intent_id: Option<String>,
    /// Product this payment purchased, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Payment-link slug the buyer used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    /// Seller receiving the payout.
    pub seller_id: String,
    /// Buyer identity reference, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    /// Charged fiat amount in minor units (cents).
    pub amount_usd_minor: u64,
    /// Payout amount in USDC minor units (6 decimal places).
    pub amount_usdc_minor: u64,
    /// Charge currency (lowercase ISO code).
    pub currency: String,
    /// Charge status.
    pub status: PaymentStatus,
    /// Processor failure message for failed/cancelled charges.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Payout settlement status.
    pub payout_status: PayoutStatus,
    /// Wallet-provider transaction id of the latest transfer attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_transaction_id: Option<String>,
    /// Number of manual payout retries. Never resets.
    pub payout_retry_count: u32,
    /// Operator-supplied reason for the latest retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_retry_reason: Option<String>,
    /// Provider failure reason when the payout failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_failure_reason: Option<String>,
    /// Stripe refund id, once refunded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    /// Refunded fiat amount in minor units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount_usd_minor: Option<u64>,
    /// Operator-supplied refund reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on the first transition into `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_initiated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_retried_at: Option<DateTime<Utc>>,
}

impl StoredPayment {
    /// Create a pending payment for a buyer-initiated checkout.
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        payment_id: String,
        stripe_payment_intent_id: Option<String>,
        product_id: String,
        payment_link: String,
        seller_id: String,
        buyer_id: Option<String>,
        amount_usd_minor: u64,
        amount_usdc_minor: u64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            payment_id,
            stripe_payment_intent_id,
            product_id: Some(product_id),
            payment_link: Some(payment_link),
            seller_id,
            buyer_id,
            amount_usd_minor,
            amount_usdc_minor,
            currency,
            status: PaymentStatus::Pending,
            failure_reason: None,
            payout_status: PayoutStatus::Unset,
            payout_transaction_id: None,
            payout_retry_count: 0,
            payout_retry_reason: None,
            payout_failure_reason: None,
            refund_id: None,
            refund_amount_usd_minor: None,
            refund_reason: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            payout_initiated_at: None,
            payout_retried_at: None,
        }
    }

    /// Create an already-completed payment for a first-seen webhook charge.
    #[allow(clippy::too_many_arguments)]
    pub fn new_completed(
        payment_id: String,
        stripe_payment_intent_id: String,
        product_id: String,
        payment_link: String,
        seller_id: String,
        buyer_id: Option<String>,
        amount_usd_minor: u64,
        amount_usdc_minor: u64,
        currency: String,
    ) -> Self {
        let mut payment = Self::new_pending(
            payment_id,
            Some(stripe_payment_intent_id),
            product_id,
            payment_link,
            seller_id,
            buyer_id,
            amount_usd_minor,
            amount_usdc_minor,
            currency,
        );
        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(payment.created_at);
        payment
    }

    /// Transition into `completed`. Returns `true` only on the first
    /// transition; repeated calls leave the record untouched.
    pub fn mark_completed(&mut self) -> bool {
        if self.status == PaymentStatus::Completed {
            return false;
        }
        let now = Utc::now();
        self.status = PaymentStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }

    /// Charged fiat amount as a decimal string, e.g. `29.99`.
    pub fn amount_usd_display(&self) -> String {
        format!(
            "{}.{:02}",
            self.amount_usd_minor / 100,
            self.amount_usd_minor % 100
        )
    }

    /// Payout amount as a decimal string, e.g. `29.990000`.
    pub fn amount_usdc_display(&self) -> String {
        format!(
            "{}.{:06}",
            self.amount_usdc_minor / 1_000_000,
            self.amount_usdc_minor % 1_000_000
        )
    }

    /// Mark the charge failed/cancelled with an optional processor reason.
    /// A completed payment is never regressed; returns `false` in that case.
    pub fn mark_charge_outcome(&mut self, status: PaymentStatus, reason: Option<String>) -> bool {
        debug_assert!(matches!(
            status,
            PaymentStatus::Failed | PaymentStatus::Cancelled
        ));
        if self.status == PaymentStatus::Completed {
            return false;
        }
        self.status = status;
        self.failure_reason = reason;
        self.updated_at = Utc::now();
        true
    }
}
