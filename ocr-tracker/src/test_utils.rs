// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mock boundary implementations and encoded-log builders for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, Filter, Log, U256};
use parking_lot::Mutex;

use ocr_types::{ConfigDigest, EthLog, Head, LogCoords, RoundRequested};

use crate::broadcast::{LogBroadcaster, LogFilterSpec, LogListener, LogSubscription};
use crate::client::{ChainClient, ConfigDetails};
use crate::error::{BroadcastError, RpcError, StoreError};
use crate::events::{address_to_topic, CONFIG_SET_TOPIC, ROUND_REQUESTED_TOPIC};
use crate::store::TrackerStore;

/// Consumption markers shared between the mock broadcaster and the mock
/// store - the stand-in for the durable dedup table both write to.
pub type MarkerSet = Arc<Mutex<HashSet<LogCoords>>>;

pub fn new_marker_set() -> MarkerSet {
    Arc::new(Mutex::new(HashSet::new()))
}

pub struct MockLogBroadcaster {
    pub markers: MarkerSet,
    pub consumed_checks: AtomicUsize,
    pub mark_calls: AtomicUsize,
    pub fail_mark: AtomicBool,
    pub registrations: Mutex<Vec<LogFilterSpec>>,
    pub unsubscribe_calls: Arc<AtomicUsize>,
}

impl MockLogBroadcaster {
    pub fn new(markers: MarkerSet) -> Self {
        Self {
            markers,
            consumed_checks: AtomicUsize::new(0),
            mark_calls: AtomicUsize::new(0),
            fail_mark: AtomicBool::new(false),
            registrations: Mutex::new(Vec::new()),
            unsubscribe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn is_marked(&self, coords: &LogCoords) -> bool {
        self.markers.lock().contains(coords)
    }
}

#[async_trait]
impl LogBroadcaster for MockLogBroadcaster {
    async fn register(
        &self,
        spec: LogFilterSpec,
        _listener: Arc<dyn LogListener>,
    ) -> Result<LogSubscription, BroadcastError> {
        self.registrations.lock().push(spec);
        let unsubscribe_calls = Arc::clone(&self.unsubscribe_calls);
        Ok(LogSubscription::new(move || {
            unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn was_already_consumed(&self, log: &EthLog) -> Result<bool, BroadcastError> {
        self.consumed_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.markers.lock().contains(&log.coords()))
    }

    async fn mark_consumed(&self, log: &EthLog) -> Result<(), BroadcastError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(BroadcastError::MarkConsumed("injected failure".into()));
        }
        self.markers.lock().insert(log.coords());
        Ok(())
    }
}

pub struct MockStore {
    pub markers: MarkerSet,
    pub persisted: Mutex<Option<RoundRequested>>,
    pub load_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub fail_load: AtomicBool,
    pub fail_transaction: AtomicBool,
}

impl MockStore {
    pub fn new(markers: MarkerSet) -> Self {
        Self {
            markers,
            persisted: Mutex::new(None),
            load_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            fail_load: AtomicBool::new(false),
            fail_transaction: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl TrackerStore for MockStore {
    async fn load_latest_round_requested(&self) -> Result<Option<RoundRequested>, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::Query("injected load failure".into()));
        }
        Ok(self.persisted.lock().clone())
    }

    async fn save_latest_round_requested(
        &self,
        round: &RoundRequested,
        log: &EthLog,
    ) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transaction.load(Ordering::SeqCst) {
            // Transaction rolls back: neither the record nor the marker land.
            return Err(StoreError::Transaction(
                "injected mid-transaction failure".into(),
            ));
        }
        *self.persisted.lock() = Some(round.clone());
        self.markers.lock().insert(log.coords());
        Ok(())
    }
}

pub struct MockChainClient {
    pub head: Mutex<Option<Head>>,
    pub head_calls: AtomicUsize,
    pub logs: Mutex<Vec<EthLog>>,
    pub filter_calls: AtomicUsize,
    pub config_details: Mutex<Option<ConfigDetails>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            head: Mutex::new(None),
            head_calls: AtomicUsize::new(0),
            logs: Mutex::new(Vec::new()),
            filter_calls: AtomicUsize::new(0),
            config_details: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn filter_logs(&self, _filter: &Filter) -> Result<Vec<EthLog>, RpcError> {
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.logs.lock().clone())
    }

    async fn head_by_number(&self, _number: Option<u64>) -> Result<Option<Head>, RpcError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.head.lock())
    }

    async fn latest_config_details(&self) -> Result<ConfigDetails, RpcError> {
        (*self.config_details.lock())
            .ok_or_else(|| RpcError::Request("no config details configured".into()))
    }
}

/// Builds an ABI-encoded `RoundRequested` log emitted by `contract`.
pub fn round_requested_log(
    coords: LogCoords,
    digest: ConfigDigest,
    epoch: u32,
    round: u8,
    requester: Address,
    contract: Address,
) -> EthLog {
    let data = abi::encode(&[
        Token::FixedBytes(digest.0.to_vec()),
        Token::Uint(U256::from(epoch)),
        Token::Uint(U256::from(round)),
    ]);
    EthLog::new(
        coords.block_number,
        coords.tx_index,
        coords.log_index,
        Log {
            address: contract,
            topics: vec![*ROUND_REQUESTED_TOPIC, address_to_topic(requester)],
            data: data.into(),
            ..Default::default()
        },
    )
}

/// Builds an ABI-encoded `ConfigSet` log with a small fixed oracle set.
pub fn config_set_log(coords: LogCoords, digest: ConfigDigest, contract: Address) -> EthLog {
    let signers: Vec<Token> = (1u8..=4)
        .map(|i| Token::Address(Address::repeat_byte(i)))
        .collect();
    let transmitters: Vec<Token> = (5u8..=8)
        .map(|i| Token::Address(Address::repeat_byte(i)))
        .collect();
    let data = abi::encode(&[
        Token::Uint(U256::from(17u64)), // previousConfigBlockNumber
        Token::FixedBytes(digest.0.to_vec()),
        Token::Uint(U256::from(6u64)), // configCount
        Token::Array(signers),
        Token::Array(transmitters),
        Token::Uint(U256::from(1u64)), // f
        Token::Bytes(vec![0xaa, 0xbb]),
        Token::Uint(U256::from(2u64)), // offchainConfigVersion
        Token::Bytes(vec![0xcc; 8]),
    ]);
    EthLog::new(
        coords.block_number,
        coords.tx_index,
        coords.log_index,
        Log {
            address: contract,
            topics: vec![*CONFIG_SET_TOPIC],
            data: data.into(),
            ..Default::default()
        },
    )
}
