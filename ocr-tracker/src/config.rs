// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-tracker configuration.

use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the monitored chain reports block height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainKind {
    #[default]
    Evm,
    /// Rollups without meaningful height semantics; block height queries
    /// short-circuit to zero and never hit the node.
    OptimisticRollup,
}

impl ChainKind {
    pub fn tracks_block_height(&self) -> bool {
        matches!(self, ChainKind::Evm)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrackerConfig {
    /// Address of the monitored aggregator contract.
    pub contract_address: Address,

    /// Job identity, carried in every log line.
    pub job_id: i32,

    #[serde(default)]
    pub chain_kind: ChainKind,

    /// Upper bound on buffered configuration values awaiting hand-off to
    /// the consensus engine. Overflow drops the oldest pending value.
    #[serde(default = "default_config_mailbox_capacity")]
    pub config_mailbox_capacity: usize,

    /// Blocks a log must be buried under before the broadcaster delivers it.
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,

    /// Deadline applied to every on-chain query issued by this tracker.
    #[serde(default = "default_rpc_deadline")]
    pub rpc_deadline: Duration,
}

// Under normal operation there is never more than one pending config; the
// capacity bound exists to keep memory finite if the consensus engine stalls
// indefinitely.
fn default_config_mailbox_capacity() -> usize {
    100
}

fn default_required_confirmations() -> u64 {
    1
}

fn default_rpc_deadline() -> Duration {
    Duration::from_secs(15)
}

impl TrackerConfig {
    pub fn new(contract_address: Address, job_id: i32) -> Self {
        Self {
            contract_address,
            job_id,
            chain_kind: ChainKind::default(),
            config_mailbox_capacity: default_config_mailbox_capacity(),
            required_confirmations: default_required_confirmations(),
            rpc_deadline: default_rpc_deadline(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_mailbox_capacity == 0 {
            return Err(ConfigError::ZeroMailboxCapacity);
        }
        if self.required_confirmations == 0 {
            return Err(ConfigError::ZeroConfirmations);
        }
        Ok(())
    }
}
