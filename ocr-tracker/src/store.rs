// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Durable store boundary.

use async_trait::async_trait;

use ocr_types::{EthLog, RoundRequested};

use crate::error::StoreError;

/// Durable state owned by one tracker instance.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// The round request persisted by a previous run, if any.
    async fn load_latest_round_requested(&self) -> Result<Option<RoundRequested>, StoreError>;

    /// Persists `round` and records `log`'s consumption marker in a single
    /// storage transaction: after this returns, either both are durable or
    /// neither is.
    async fn save_latest_round_requested(
        &self,
        round: &RoundRequested,
        log: &EthLog,
    ) -> Result<(), StoreError>;
}
