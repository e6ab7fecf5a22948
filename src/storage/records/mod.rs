// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Persisted record types.

pub mod payment;
pub mod product;
pub mod seller;

pub use payment::{PaymentStatus, PayoutStatus, StoredPayment};
pub use product::{ProductStatus, StoredProduct};
pub use seller::SellerWallet;
