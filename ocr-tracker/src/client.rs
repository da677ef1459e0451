// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain RPC boundary.

use async_trait::async_trait;
use ethers::types::{BlockNumber, Filter};

use ocr_types::{ConfigDigest, EthLog, Head};

use crate::error::RpcError;

/// Latest configuration summary held by the aggregator contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDetails {
    pub changed_in_block: u64,
    pub config_digest: ConfigDigest,
}

/// The slice of the node RPC surface this tracker needs. Implementations
/// wrap the chain client; cancellation and deadlines are applied at the call
/// site by the tracker's combined query context.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Logs matching `filter`, oldest first.
    async fn filter_logs(&self, filter: &Filter) -> Result<Vec<EthLog>, RpcError>;

    /// Header by number; `None` requests the latest head.
    async fn head_by_number(&self, number: Option<u64>) -> Result<Option<Head>, RpcError>;

    /// The contract's `latestConfigDetails()` call.
    async fn latest_config_details(&self) -> Result<ConfigDetails, RpcError>;
}

/// Chain-specific translation from "config changed in block N" to the block
/// range an on-chain log filter should scan.
pub trait BlockTranslator: Send + Sync {
    fn number_to_query_range(&self, changed_in_block: u64) -> (BlockNumber, BlockNumber);
}

/// Translator for chains whose log filters can address the exact block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBlockTranslator;

impl BlockTranslator for SingleBlockTranslator {
    fn number_to_query_range(&self, changed_in_block: u64) -> (BlockNumber, BlockNumber) {
        (
            BlockNumber::Number(changed_in_block.into()),
            BlockNumber::Number(changed_in_block.into()),
        )
    }
}
