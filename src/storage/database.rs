// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Embedded payment database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `payments`: payment_id → serialized StoredPayment
//! - `payment_intent_index`: stripe payment-intent id → payment_id (unique)
//! - `products`: product_id → serialized StoredProduct
//! - `product_link_index`: payment-link slug → product_id (unique)
//! - `seller_wallets`: seller_id → serialized SellerWallet
//!
//! redb's single-writer write transaction is the serialization point for
//! every conditional mutation: the intent index is inserted in the same
//! transaction as the payment record (duplicate webhook deliveries race
//! onto the existing-record path instead of double-inserting), and payout
//! transitions re-validate the current status inside the transaction so a
//! concurrent writer can never be clobbered by a stale read.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::records::{PaymentStatus, PayoutStatus, SellerWallet, StoredPayment, StoredProduct};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: payment_id → serialized StoredPayment (JSON bytes).
const PAYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

/// Unique index: stripe payment-intent id → payment_id.
const PAYMENT_INTENT_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("payment_intent_index");

/// Primary table: product_id → serialized StoredProduct (JSON bytes).
const PRODUCTS: TableDefinition<&str, &[u8]> = TableDefinition::new("products");

/// Unique index: payment-link slug → product_id.
const PRODUCT_LINK_INDEX: TableDefinition<&str, &str> = TableDefinition::new("product_link_index");

/// Primary table: seller_id → serialized SellerWallet (JSON bytes).
const SELLER_WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("seller_wallets");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Precondition violation: the record's current status forbids the
    /// requested transition. Never retried automatically.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Reconcile Outcome
// =============================================================================

/// Result of the atomic find-or-create-and-complete step.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// No payment existed for the intent id; a completed record was created.
    Created(StoredPayment),
    /// An existing payment transitioned into `completed` for the first time.
    Transitioned(StoredPayment),
    /// The payment was already `completed`; nothing was written.
    AlreadyCompleted(StoredPayment),
}

impl ReconcileOutcome {
    /// Whether this call performed the first transition into `completed`.
    /// Payout initiation is gated on this.
    pub fn first_completion(&self) -> bool {
        !matches!(self, ReconcileOutcome::AlreadyCompleted(_))
    }

    pub fn payment(&self) -> &StoredPayment {
        match self {
            ReconcileOutcome::Created(p)
            | ReconcileOutcome::Transitioned(p)
            | ReconcileOutcome::AlreadyCompleted(p) => p,
        }
    }

    pub fn into_payment(self) -> StoredPayment {
        match self {
            ReconcileOutcome::Created(p)
            | ReconcileOutcome::Transitioned(p)
            | ReconcileOutcome::AlreadyCompleted(p) => p,
        }
    }
}

// =============================================================================
// PaymentDatabase
// =============================================================================

/// Embedded ACID store for payments, products and seller wallets.
pub struct PaymentDatabase {
    db: Database,
}

impl PaymentDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PAYMENTS)?;
            let _ = write_txn.open_table(PAYMENT_INTENT_INDEX)?;
            let _ = write_txn.open_table(PRODUCTS)?;
            let _ = write_txn.open_table(PRODUCT_LINK_INDEX)?;
            let _ = write_txn.open_table(SELLER_WALLETS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Insert a new payment. When the record carries a payment-intent id the
    /// unique index entry is written in the same transaction; a duplicate
    /// intent id fails the whole insert.
    pub fn create_payment(&self, payment: &StoredPayment) -> StoreResult<()> {
        let json = serde_json::to_vec(payment)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let mut index = write_txn.open_table(PAYMENT_INTENT_INDEX)?;

            if payments.get(payment.payment_id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "Payment {}",
                    payment.payment_id
                )));
            }
            if let Some(intent_id) = payment.stripe_payment_intent_id.as_deref() {
                if index.get(intent_id)?.is_some() {
                    return Err(StoreError::AlreadyExists(format!(
                        "Payment intent {intent_id}"
                    )));
                }
                index.insert(intent_id, payment.payment_id.as_str())?;
            }
            payments.insert(payment.payment_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a payment by internal id.
    pub fn get_payment(&self, payment_id: &str) -> StoreResult<Option<StoredPayment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENTS)?;
        match table.get(payment_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a payment by stripe payment-intent id.
    pub fn get_payment_by_intent(&self, intent_id: &str) -> StoreResult<Option<StoredPayment>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PAYMENT_INTENT_INDEX)?;
        let Some(payment_id) = index.get(intent_id)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let payments = read_txn.open_table(PAYMENTS)?;
        match payments.get(payment_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List a seller's payments, newest first.
    pub fn list_payments_by_seller(&self, seller_id: &str) -> StoreResult<Vec<StoredPayment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENTS)?;

        let mut payments = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let payment: StoredPayment = serde_json::from_slice(value.value())?;
            if payment.seller_id == seller_id {
                payments.push(payment);
            }
        }
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    /// Atomic find-or-create-and-complete, keyed by payment-intent id.
    ///
    /// One write transaction covers the index probe, the insert and the
    /// status transition, so duplicate webhook deliveries for the same
    /// intent id serialize: the first call creates (or transitions) the
    /// record, every later call lands on [`ReconcileOutcome::AlreadyCompleted`].
    ///
    /// `candidate` is the fully-built completed payment to insert when no
    /// record exists yet; it must carry `intent_id` as its own intent id.
    /// Passing `None` when no record exists is a `NotFound` error.
    pub fn complete_payment_by_intent(
        &self,
        intent_id: &str,
        candidate: Option<StoredPayment>,
    ) -> StoreResult<ReconcileOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let mut index = write_txn.open_table(PAYMENT_INTENT_INDEX)?;

            let existing_id = index.get(intent_id)?.map(|v| v.value().to_string());
            match existing_id {
                Some(payment_id) => {
                    let bytes = payments
                        .get(payment_id.as_str())?
                        .ok_or_else(|| StoreError::NotFound(format!("Payment {payment_id}")))?
                        .value()
                        .to_vec();
                    let mut payment: StoredPayment = serde_json::from_slice(&bytes)?;
                    if payment.mark_completed() {
                        let json = serde_json::to_vec(&payment)?;
                        payments.insert(payment_id.as_str(), json.as_slice())?;
                        ReconcileOutcome::Transitioned(payment)
                    } else {
                        ReconcileOutcome::AlreadyCompleted(payment)
                    }
                }
                None => {
                    let candidate = candidate.ok_or_else(|| {
                        StoreError::NotFound(format!("Payment for intent {intent_id}"))
                    })?;
                    debug_assert_eq!(
                        candidate.stripe_payment_intent_id.as_deref(),
                        Some(intent_id)
                    );
                    let json = serde_json::to_vec(&candidate)?;
                    payments.insert(candidate.payment_id.as_str(), json.as_slice())?;
                    index.insert(intent_id, candidate.payment_id.as_str())?;
                    ReconcileOutcome::Created(candidate)
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Record a failed or cancelled charge for the payment matching the
    /// intent id. A payment already `completed` is never regressed; an
    /// unknown intent id returns `Ok(None)`.
    pub fn record_charge_outcome_by_intent(
        &self,
        intent_id: &str,
        status: PaymentStatus,
        reason: Option<String>,
    ) -> StoreResult<Option<StoredPayment>> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let index = write_txn.open_table(PAYMENT_INTENT_INDEX)?;

            let Some(payment_id) = index.get(intent_id)?.map(|v| v.value().to_string()) else {
                return Ok(None);
            };
            let bytes = payments
                .get(payment_id.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("Payment {payment_id}")))?
                .value()
                .to_vec();
            let mut payment: StoredPayment = serde_json::from_slice(&bytes)?;
            if payment.mark_charge_outcome(status, reason) {
                let json = serde_json::to_vec(&payment)?;
                payments.insert(payment_id.as_str(), json.as_slice())?;
            }
            payment
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    /// Persist a successful first transfer request. Re-validates the charge
    /// and payout status inside the transaction.
    pub fn record_payout_initiated(
        &self,
        payment_id: &str,
        transaction_id: &str,
    ) -> StoreResult<StoredPayment> {
        self.mutate_payment(payment_id, |payment| {
            if payment.status != PaymentStatus::Completed {
                return Err(StoreError::InvalidState(format!(
                    "payment {payment_id} is not completed"
                )));
            }
            if !payment.payout_status.can_initiate() {
                return Err(StoreError::InvalidState(format!(
                    "payout for payment {payment_id} is already in progress or completed"
                )));
            }
            let now = Utc::now();
            payment.payout_status = PayoutStatus::Initiated;
            payment.payout_transaction_id = Some(transaction_id.to_string());
            payment.payout_failure_reason = None;
            payment.payout_initiated_at = Some(now);
            payment.updated_at = now;
            Ok(())
        })
    }

    /// Persist a successful manual retry: bumps the retry counter by exactly
    /// one and replaces the transaction id (the old attempt is presumed
    /// abandoned). Re-validates status inside the transaction.
    pub fn record_payout_retry(
        &self,
        payment_id: &str,
        transaction_id: &str,
        reason: Option<String>,
    ) -> StoreResult<StoredPayment> {
        self.mutate_payment(payment_id, |payment| {
            if payment.status != PaymentStatus::Completed {
                return Err(StoreError::InvalidState(format!(
                    "payment {payment_id} is not completed"
                )));
            }
            if !payment.payout_status.can_retry() {
                return Err(StoreError::InvalidState(format!(
                    "payout for payment {payment_id} is already completed"
                )));
            }
            let now = Utc::now();
            payment.payout_status = PayoutStatus::Retrying;
            payment.payout_retry_count += 1;
            payment.payout_transaction_id = Some(transaction_id.to_string());
            payment.payout_retry_reason = reason;
            payment.payout_failure_reason = None;
            payment.payout_retried_at = Some(now);
            payment.updated_at = now;
            Ok(())
        })
    }

    /// Conditionally advance the payout to a provider-reported terminal
    /// status (`completed` or `failed`). A transition forbidden by the state
    /// machine (notably anything out of `completed`) leaves the record
    /// untouched, so a refresh can never clobber a just-completed payout.
    pub fn settle_payout(
        &self,
        payment_id: &str,
        settled: PayoutStatus,
        failure_reason: Option<String>,
    ) -> StoreResult<StoredPayment> {
        debug_assert!(matches!(
            settled,
            PayoutStatus::Completed | PayoutStatus::Failed
        ));
        self.mutate_payment(payment_id, |payment| {
            if !payment.payout_status.can_transition_to(settled) {
                return Ok(());
            }
            payment.payout_status = settled;
            payment.payout_failure_reason = if settled == PayoutStatus::Failed {
                failure_reason.clone()
            } else {
                None
            };
            payment.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Stamp refund metadata onto a completed payment.
    pub fn record_refund(
        &self,
        payment_id: &str,
        refund_id: &str,
        amount_usd_minor: u64,
        reason: Option<String>,
    ) -> StoreResult<StoredPayment> {
        self.mutate_payment(payment_id, |payment| {
            if payment.status != PaymentStatus::Completed {
                return Err(StoreError::InvalidState(format!(
                    "payment {payment_id} is not completed"
                )));
            }
            let now = Utc::now();
            payment.refund_id = Some(refund_id.to_string());
            payment.refund_amount_usd_minor = Some(amount_usd_minor);
            payment.refund_reason = reason;
            payment.refunded_at = Some(now);
            payment.updated_at = now;
            Ok(())
        })
    }

    /// Read-modify-write of a single payment inside one write transaction.
    fn mutate_payment<F>(&self, payment_id: &str, mutate: F) -> StoreResult<StoredPayment>
    where
        F: FnOnce(&mut StoredPayment) -> StoreResult<()>,
    {
        let write_txn = self.db.begin_write()?;
        let payment = {
            let mut payments = write_txn.open_table(PAYMENTS)?;
            let bytes = payments
                .get(payment_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Payment {payment_id}")))?
                .value()
                .to_vec();
            let mut payment: StoredPayment = serde_json::from_slice(&bytes)?;
            mutate(&mut payment)?;
            let json = serde_json::to_vec(&payment)?;
            payments.insert(payment_id, json.as_slice())?;
            payment
        };
        write_txn.commit()?;
        Ok(payment)
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Insert a new product; the payment-link slug must be unused.
    pub fn create_product(&self, product: &StoredProduct) -> StoreResult<()> {
        let json = serde_json::to_vec(product)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut products = write_txn.open_table(PRODUCTS)?;
            let mut index = write_txn.open_table(PRODUCT_LINK_INDEX)?;

            if products.get(product.product_id.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "Product {}",
                    product.product_id
                )));
            }
            if index.get(product.payment_link.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "Payment link {}",
                    product.payment_link
                )));
            }
            index.insert(product.payment_link.as_str(), product.product_id.as_str())?;
            products.insert(product.product_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a product by id.
    pub fn get_product(&self, product_id: &str) -> StoreResult<Option<StoredProduct>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;
        match table.get(product_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a product by payment-link slug.
    pub fn get_product_by_link(&self, payment_link: &str) -> StoreResult<Option<StoredProduct>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PRODUCT_LINK_INDEX)?;
        let Some(product_id) = index.get(payment_link)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let products = read_txn.open_table(PRODUCTS)?;
        match products.get(product_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// List a seller's products, newest first.
    pub fn list_products_by_seller(&self, seller_id: &str) -> StoreResult<Vec<StoredProduct>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS)?;

        let mut products = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let product: StoredProduct = serde_json::from_slice(value.value())?;
            if product.seller_id == seller_id {
                products.push(product);
            }
        }
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    /// Flip a product's active flag.
    pub fn set_product_active(&self, product_id: &str, active: bool) -> StoreResult<StoredProduct> {
        let write_txn = self.db.begin_write()?;
        let product = {
            let mut products = write_txn.open_table(PRODUCTS)?;
            let bytes = products
                .get(product_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Product {product_id}")))?
                .value()
                .to_vec();
            let mut product: StoredProduct = serde_json::from_slice(&bytes)?;
            product.active = active;
            product.updated_at = Utc::now();
            let json = serde_json::to_vec(&product)?;
            products.insert(product_id, json.as_slice())?;
            product
        };
        write_txn.commit()?;
        Ok(product)
    }

    // =========================================================================
    // Seller wallets
    // =========================================================================

    /// Register or replace a seller's payout wallet. `created_at` of an
    /// existing registration is preserved.
    pub fn put_seller_wallet(&self, wallet: &SellerWallet) -> StoreResult<SellerWallet> {
        let write_txn = self.db.begin_write()?;
        let stored = {
            let mut table = write_txn.open_table(SELLER_WALLETS)?;
            let existing: Option<SellerWallet> = match table.get(wallet.seller_id.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let mut stored = wallet.clone();
            if let Some(existing) = existing {
                stored.created_at = existing.created_at;
            }
            stored.updated_at = Utc::now();
            let json = serde_json::to_vec(&stored)?;
            table.insert(wallet.seller_id.as_str(), json.as_slice())?;
            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    /// Look up a seller's payout wallet.
    pub fn get_seller_wallet(&self, seller_id: &str) -> StoreResult<Option<SellerWallet>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SELLER_WALLETS)?;
        match table.get(seller_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
