// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Paylink Labs

//! Recording wallet-provider double for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    CreateTransferRequest, PayoutProvider, ProviderError, TransferExecution,
    TransferExecutionStatus, TransferStatusDetails,
};

/// Records every transfer-creation call so tests can assert the external
/// provider was (or was not) reached.
pub struct RecordingProvider {
    /// Idempotency keys of all create calls, in order.
    pub calls: Mutex<Vec<String>>,
    /// When set, create calls fail without issuing a transaction id.
    pub fail_create: bool,
    /// Status reported on successful create calls.
    pub create_status: TransferExecutionStatus,
    /// Canned answer for fetch calls; `None` makes fetch fail.
    pub fetch_result: Mutex<Option<TransferStatusDetails>>,
    counter: AtomicUsize,
}

impl Default for RecordingProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_create: false,
            create_status: TransferExecutionStatus::Pending,
            fetch_result: Mutex::new(None),
            counter: AtomicUsize::new(0),
        }
    }
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// Provider that reports the given status directly on create.
    pub fn with_create_status(status: TransferExecutionStatus) -> Self {
        Self {
            create_status: status,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_key(&self) -> Option<String> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn set_fetch_result(&self, details: TransferStatusDetails) {
        *self.fetch_result.lock().unwrap() = Some(details);
    }
}

#[async_trait]
impl PayoutProvider for RecordingProvider {
    async fn create_transfer(
        &self,
        request: CreateTransferRequest<'_>,
    ) -> Result<TransferExecution, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(request.idempotency_key.to_string());
        if self.fail_create {
            return Err(ProviderError::Request("transfer rejected".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransferExecution {
            transaction_id: format!("tx-{n}"),
            status: self.create_status,
        })
    }

    async fn fetch_transfer(
        &self,
        _transaction_id: &str,
    ) -> Result<TransferStatusDetails, ProviderError> {
        self.fetch_result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Request("no status available".to_string()))
    }
}
