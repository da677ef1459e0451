// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared data model for the aggregator contract tracker: decoded contract
//! events, log coordinates and the ordering they induce, and block headers.

use std::fmt;

use ethers::types::{Address, Log};
use serde::{Deserialize, Serialize};

/// Position of a log on the chain: block number, transaction index within
/// the block, log index within the transaction's receipt.
///
/// The derived ordering is lexicographic over the three fields, which is
/// exactly the chain's notion of "emitted after": later fields are only
/// consulted when earlier ones tie.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogCoords {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
}

impl LogCoords {
    pub fn new(block_number: u64, tx_index: u64, log_index: u64) -> Self {
        Self {
            block_number,
            tx_index,
            log_index,
        }
    }

    /// True if `self` was emitted strictly after `other` from the chain's
    /// point of view. Equal coordinates are not later.
    pub fn is_later_than(&self, other: &LogCoords) -> bool {
        self > other
    }
}

pub const CONFIG_DIGEST_LENGTH: usize = 32;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("config digest must be {CONFIG_DIGEST_LENGTH} bytes, got {0}")]
pub struct InvalidDigestLength(pub usize);

/// Opaque identifier binding one configuration version of the contract.
/// The all-zero digest is the "nothing observed" value.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigDigest(pub [u8; CONFIG_DIGEST_LENGTH]);

impl ConfigDigest {
    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, InvalidDigestLength> {
        let raw: [u8; CONFIG_DIGEST_LENGTH] = bytes
            .try_into()
            .map_err(|_| InvalidDigestLength(bytes.len()))?;
        Ok(Self(raw))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; CONFIG_DIGEST_LENGTH]
    }
}

impl fmt::Display for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", ethers::utils::hex::encode(self.0))
    }
}

impl fmt::Debug for ConfigDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<[u8; CONFIG_DIGEST_LENGTH]> for ConfigDigest {
    fn from(raw: [u8; CONFIG_DIGEST_LENGTH]) -> Self {
        Self(raw)
    }
}

/// Consensus parameters announced by a `ConfigSet` event. Immutable once
/// decoded; `raw` carries the source-event coordinates for staleness checks
/// downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub config_digest: ConfigDigest,
    pub config_count: u64,
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
    /// Fault-tolerance threshold: the protocol tolerates up to `f` faulty
    /// oracles.
    pub f: u8,
    pub onchain_config: Vec<u8>,
    pub offchain_config_version: u64,
    pub offchain_config: Vec<u8>,
    pub raw: LogCoords,
}

/// A `RoundRequested` event: an on-chain ask for the off-chain protocol to
/// produce a new report round. The zero value is the valid "never observed"
/// steady state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRequested {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
    pub requester: Address,
    pub raw: LogCoords,
}

/// A raw log delivered by the log broadcaster, paired with its extracted
/// chain coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthLog {
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub log: Log,
}

impl EthLog {
    pub fn new(block_number: u64, tx_index: u64, log_index: u64, log: Log) -> Self {
        Self {
            block_number,
            tx_index,
            log_index,
            log,
        }
    }

    pub fn coords(&self) -> LogCoords {
        LogCoords::new(self.block_number, self.tx_index, self.log_index)
    }

    pub fn address(&self) -> Address {
        self.log.address
    }
}

/// A block header as pushed by the header broadcaster. Some chains carry an
/// alternate L1 block number that supersedes the native one for
/// confirmation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub number: u64,
    pub l1_block_number: Option<u64>,
}

impl Head {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            l1_block_number: None,
        }
    }

    pub fn with_l1_block_number(number: u64, l1_block_number: u64) -> Self {
        Self {
            number,
            l1_block_number: Some(l1_block_number),
        }
    }

    /// The height confirmations are counted against.
    pub fn effective_height(&self) -> u64 {
        self.l1_block_number.unwrap_or(self.number)
    }
}
