// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! # Payment Storage Module
//!
//! Persistent storage for payments, products and seller wallets, backed by
//! a single embedded redb database file under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   paylink.redb      # payments, products, seller wallets + index tables
//! ```
//!
//! ## Consistency Model
//!
//! - Every record is JSON-serialized into a redb table keyed by its id.
//! - Uniqueness (payment-intent id, payment-link slug) is enforced by index
//!   tables written in the same transaction as the primary record.
//! - All conditional mutations (complete-by-intent, payout transitions) are
//!   read-modify-write inside one write transaction; redb's single writer
//!   serializes racing requests.

pub mod database;
pub mod records;

pub use database::{PaymentDatabase, ReconcileOutcome, StoreError, StoreResult};
pub use records::{
    PaymentStatus, PayoutStatus, ProductStatus, SellerWallet, StoredPayment, StoredProduct,
};
