// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use ethers::types::Address;
use thiserror::Error;

/// Errors surfaced by the chain RPC boundary.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc request failed: {0}")]
    Request(String),

    #[error("malformed rpc response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the durable store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage query failed: {0}")]
    Query(String),

    #[error("storage transaction failed: {0}")]
    Transaction(String),
}

/// Errors surfaced by the log-delivery boundary.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("log registration failed: {0}")]
    Register(String),

    #[error("consumption marker lookup failed: {0}")]
    Lookup(String),

    #[error("failed to mark log consumed: {0}")]
    MarkConsumed(String),
}

/// A log could not be decoded against the known event shapes. Never
/// retryable: a malformed event stays malformed.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("could not decode {event} event: {reason}")]
    Malformed {
        event: &'static str,
        reason: String,
    },

    #[error(transparent)]
    BadDigest(#[from] ocr_types::InvalidDigestLength),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config-mailbox-capacity must be at least 1")]
    ZeroMailboxCapacity,

    #[error("required-confirmations must be at least 1")]
    ZeroConfirmations,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Decode(#[from] EventError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no ConfigSet logs found for contract {0:?}")]
    NoConfigLogs(Address),

    #[error("log address {actual:?} does not match configured contract {expected:?}")]
    AddressMismatch { actual: Address, expected: Address },

    #[error("node returned no head")]
    MissingHead,

    #[error("tracker is shutting down")]
    Shutdown,

    #[error("on-chain query exceeded deadline of {0:?}")]
    Deadline(Duration),

    #[error("tracker was already stopped")]
    Stopped,
}

pub type TrackerResult<T> = Result<T, TrackerError>;
