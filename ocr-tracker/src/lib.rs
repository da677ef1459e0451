// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Tracks a single on-chain aggregator contract for one off-chain reporting
//! job.
//!
//! The tracker sits between the log-delivery subsystem (which pushes
//! deduplicated contract logs at it) and the consensus engine (which polls
//! its query surface and optionally drains a channel of configuration
//! values). It keeps the latest known `RoundRequested` and block height
//! under concurrent access, relays `ConfigSet` events through a bounded
//! mailbox so slow consumers can never back-pressure log delivery, and
//! pairs round-request persistence with consumption marking in one storage
//! transaction.

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod metrics;
pub mod store;
pub mod tracker;

#[cfg(test)]
pub mod test_utils;

pub use config::{ChainKind, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use tracker::ContractTracker;
