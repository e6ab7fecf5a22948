// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

use std::sync::Arc;

use crate::providers::stripe::StripeClient;
use crate::providers::PayoutProvider;
use crate::storage::PaymentDatabase;

/// Shared application state. Provider clients are constructed at startup
/// and injected here; an unconfigured provider degrades its endpoints to
/// 503 instead of failing the whole service.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PaymentDatabase>,
    pub payouts: Option<Arc<dyn PayoutProvider>>,
    pub stripe: Option<Arc<StripeClient>>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(db: PaymentDatabase) -> Self {
        Self {
            db: Arc::new(db),
            payouts: None,
            stripe: None,
            webhook_secret: None,
        }
    }
}
