// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Boundaries to the log-delivery subsystem and the header broadcaster.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, H256};
use tokio::sync::watch;

use ocr_types::{EthLog, Head};

use crate::error::BroadcastError;

/// Registration options handed to the log-delivery subsystem.
#[derive(Debug, Clone)]
pub struct LogFilterSpec {
    pub contract: Address,
    pub topics: Vec<H256>,
    /// Blocks a log must be buried under before delivery.
    pub required_confirmations: u64,
}

/// Receiver of delivered logs.
///
/// The broadcaster invokes `handle_log` serially per listener; a listener is
/// never handed two logs concurrently. Listeners must tolerate redelivery -
/// the consumption marker makes a redelivered log a no-op.
#[async_trait]
pub trait LogListener: Send + Sync {
    async fn handle_log(&self, log: EthLog);

    /// Job identity, used by the broadcaster for its own bookkeeping.
    fn job_id(&self) -> i32;
}

/// Undo handle returned by [`LogBroadcaster::register`]. No further logs are
/// delivered after `unsubscribe` returns.
pub struct LogSubscription(Box<dyn FnOnce() + Send>);

impl LogSubscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(unsubscribe))
    }

    pub fn unsubscribe(self) {
        (self.0)()
    }
}

impl fmt::Debug for LogSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSubscription")
    }
}

/// At-least-once, deduplicated delivery of matching contract logs.
///
/// Consumption markers are durable and keyed by log coordinates; they are
/// what makes redelivery harmless. `mark_consumed` records a marker outside
/// any storage transaction - transactional marking happens through
/// [`crate::store::TrackerStore::save_latest_round_requested`], which writes
/// the same marker table.
#[async_trait]
pub trait LogBroadcaster: Send + Sync {
    async fn register(
        &self,
        spec: LogFilterSpec,
        listener: Arc<dyn LogListener>,
    ) -> Result<LogSubscription, BroadcastError>;

    /// Whether `log`'s consumption marker is already present.
    async fn was_already_consumed(&self, log: &EthLog) -> Result<bool, BroadcastError>;

    async fn mark_consumed(&self, log: &EthLog) -> Result<(), BroadcastError>;
}

/// Header feed: `borrow()` yields the most recent known head (if any), new
/// heads arrive via `changed()`.
pub type HeadReceiver = watch::Receiver<Option<Head>>;
