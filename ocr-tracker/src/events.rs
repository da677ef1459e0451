// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the two aggregator event shapes this tracker understands.
//!
//! The dispatch is a closed tagged variant: a log either decodes into one of
//! the known shapes or is `Unrecognized`. Topic hashes and ABI parameter
//! tables are computed once and reused for every log.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

use ocr_types::{ConfigDigest, ContractConfig, EthLog, RoundRequested};

use crate::error::EventError;

/// `ConfigSet(uint32 previousConfigBlockNumber, bytes32 configDigest,
/// uint64 configCount, address[] signers, address[] transmitters, uint8 f,
/// bytes onchainConfig, uint64 offchainConfigVersion, bytes offchainConfig)`
pub static CONFIG_SET_TOPIC: Lazy<H256> = Lazy::new(|| {
    H256::from(keccak256(
        "ConfigSet(uint32,bytes32,uint64,address[],address[],uint8,bytes,uint64,bytes)",
    ))
});

/// `RoundRequested(address indexed requester, bytes32 configDigest,
/// uint32 epoch, uint8 round)`
pub static ROUND_REQUESTED_TOPIC: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("RoundRequested(address,bytes32,uint32,uint8)")));

static CONFIG_SET_PARAMS: Lazy<[ParamType; 9]> = Lazy::new(|| {
    [
        ParamType::Uint(32),
        ParamType::FixedBytes(32),
        ParamType::Uint(64),
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Uint(8),
        ParamType::Bytes,
        ParamType::Uint(64),
        ParamType::Bytes,
    ]
});

static ROUND_REQUESTED_PARAMS: Lazy<[ParamType; 3]> = Lazy::new(|| {
    [
        ParamType::FixedBytes(32),
        ParamType::Uint(32),
        ParamType::Uint(8),
    ]
});

/// A log classified against the known aggregator event shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorEvent {
    ConfigSet(ContractConfig),
    RoundRequested(RoundRequested),
    /// Topic outside the known set, or a log with no topics at all.
    Unrecognized(Option<H256>),
}

impl AggregatorEvent {
    pub fn decode(log: &EthLog) -> Result<Self, EventError> {
        let Some(topic0) = log.log.topics.first() else {
            return Ok(AggregatorEvent::Unrecognized(None));
        };
        if *topic0 == *CONFIG_SET_TOPIC {
            decode_config_set(log).map(AggregatorEvent::ConfigSet)
        } else if *topic0 == *ROUND_REQUESTED_TOPIC {
            decode_round_requested(log).map(AggregatorEvent::RoundRequested)
        } else {
            Ok(AggregatorEvent::Unrecognized(Some(*topic0)))
        }
    }
}

fn decode_config_set(log: &EthLog) -> Result<ContractConfig, EventError> {
    let mut tokens = abi::decode(&*CONFIG_SET_PARAMS, &log.log.data)
        .map_err(|e| malformed("ConfigSet", e.to_string()))?
        .into_iter();

    // The contract reports the block of the previous config here; the
    // decoded config does not carry it.
    let _previous_config_block = take_uint(&mut tokens, "ConfigSet", "previousConfigBlockNumber")?;
    let digest = take_fixed_bytes(&mut tokens, "ConfigSet", "configDigest")?;
    let config_count = narrow_u64(
        take_uint(&mut tokens, "ConfigSet", "configCount")?,
        "ConfigSet",
        "configCount",
    )?;
    let signers = take_address_array(&mut tokens, "ConfigSet", "signers")?;
    let transmitters = take_address_array(&mut tokens, "ConfigSet", "transmitters")?;
    let f = narrow_u8(take_uint(&mut tokens, "ConfigSet", "f")?, "ConfigSet", "f")?;
    let onchain_config = take_bytes(&mut tokens, "ConfigSet", "onchainConfig")?;
    let offchain_config_version = narrow_u64(
        take_uint(&mut tokens, "ConfigSet", "offchainConfigVersion")?,
        "ConfigSet",
        "offchainConfigVersion",
    )?;
    let offchain_config = take_bytes(&mut tokens, "ConfigSet", "offchainConfig")?;

    Ok(ContractConfig {
        config_digest: ConfigDigest::try_from_bytes(&digest)?,
        config_count,
        signers,
        transmitters,
        f,
        onchain_config,
        offchain_config_version,
        offchain_config,
        raw: log.coords(),
    })
}

fn decode_round_requested(log: &EthLog) -> Result<RoundRequested, EventError> {
    let requester_topic = log
        .log
        .topics
        .get(1)
        .ok_or_else(|| malformed("RoundRequested", "missing requester topic"))?;
    let requester = address_from_topic(requester_topic);

    let mut tokens = abi::decode(&*ROUND_REQUESTED_PARAMS, &log.log.data)
        .map_err(|e| malformed("RoundRequested", e.to_string()))?
        .into_iter();

    let digest = take_fixed_bytes(&mut tokens, "RoundRequested", "configDigest")?;
    let epoch = narrow_u32(
        take_uint(&mut tokens, "RoundRequested", "epoch")?,
        "RoundRequested",
        "epoch",
    )?;
    let round = narrow_u8(
        take_uint(&mut tokens, "RoundRequested", "round")?,
        "RoundRequested",
        "round",
    )?;

    Ok(RoundRequested {
        config_digest: ConfigDigest::try_from_bytes(&digest)?,
        epoch,
        round,
        requester,
        raw: log.coords(),
    })
}

/// Indexed address arguments occupy the low 20 bytes of their topic word.
pub fn address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

pub fn address_to_topic(address: Address) -> H256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    H256::from(word)
}

fn malformed(event: &'static str, reason: impl Into<String>) -> EventError {
    EventError::Malformed {
        event,
        reason: reason.into(),
    }
}

fn take_uint(
    tokens: &mut impl Iterator<Item = Token>,
    event: &'static str,
    field: &str,
) -> Result<U256, EventError> {
    tokens
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| malformed(event, format!("missing or mistyped field {field}")))
}

fn take_fixed_bytes(
    tokens: &mut impl Iterator<Item = Token>,
    event: &'static str,
    field: &str,
) -> Result<Vec<u8>, EventError> {
    tokens
        .next()
        .and_then(Token::into_fixed_bytes)
        .ok_or_else(|| malformed(event, format!("missing or mistyped field {field}")))
}

fn take_bytes(
    tokens: &mut impl Iterator<Item = Token>,
    event: &'static str,
    field: &str,
) -> Result<Vec<u8>, EventError> {
    tokens
        .next()
        .and_then(Token::into_bytes)
        .ok_or_else(|| malformed(event, format!("missing or mistyped field {field}")))
}

fn take_address_array(
    tokens: &mut impl Iterator<Item = Token>,
    event: &'static str,
    field: &str,
) -> Result<Vec<Address>, EventError> {
    let elements = tokens
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| malformed(event, format!("missing or mistyped field {field}")))?;
    elements
        .into_iter()
        .map(|t| {
            t.into_address()
                .ok_or_else(|| malformed(event, format!("non-address element in {field}")))
        })
        .collect()
}

fn narrow_u64(value: U256, event: &'static str, field: &str) -> Result<u64, EventError> {
    if value > U256::from(u64::MAX) {
        return Err(malformed(event, format!("{field} out of range: {value}")));
    }
    Ok(value.as_u64())
}

fn narrow_u32(value: U256, event: &'static str, field: &str) -> Result<u32, EventError> {
    if value > U256::from(u32::MAX) {
        return Err(malformed(event, format!("{field} out of range: {value}")));
    }
    Ok(value.as_u32())
}

fn narrow_u8(value: U256, event: &'static str, field: &str) -> Result<u8, EventError> {
    if value > U256::from(u8::MAX) {
        return Err(malformed(event, format!("{field} out of range: {value}")));
    }
    Ok(value.as_u32() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{config_set_log, round_requested_log};
    use ethers::types::Log;
    use ocr_types::LogCoords;

    #[test]
    fn decodes_config_set() {
        let contract = Address::repeat_byte(0x42);
        let digest = ConfigDigest::from([9u8; 32]);
        let log = config_set_log(LogCoords::new(50, 1, 0), digest, contract);

        let event = AggregatorEvent::decode(&log).unwrap();
        let AggregatorEvent::ConfigSet(config) = event else {
            panic!("expected ConfigSet, got {event:?}");
        };
        assert_eq!(config.config_digest, digest);
        assert_eq!(config.signers.len(), 4);
        assert_eq!(config.transmitters.len(), 4);
        assert_eq!(config.f, 1);
        assert_eq!(config.offchain_config_version, 2);
        assert_eq!(config.raw, LogCoords::new(50, 1, 0));
    }

    #[test]
    fn decodes_round_requested() {
        let contract = Address::repeat_byte(0x42);
        let requester = Address::repeat_byte(0x07);
        let digest = ConfigDigest::from([3u8; 32]);
        let log = round_requested_log(LogCoords::new(100, 2, 1), digest, 5, 9, requester, contract);

        let event = AggregatorEvent::decode(&log).unwrap();
        let AggregatorEvent::RoundRequested(round) = event else {
            panic!("expected RoundRequested, got {event:?}");
        };
        assert_eq!(round.config_digest, digest);
        assert_eq!(round.epoch, 5);
        assert_eq!(round.round, 9);
        assert_eq!(round.requester, requester);
        assert_eq!(round.raw, LogCoords::new(100, 2, 1));
    }

    #[test]
    fn classifies_unknown_topic() {
        let topic = H256::repeat_byte(0xee);
        let log = EthLog::new(
            1,
            0,
            0,
            Log {
                address: Address::zero(),
                topics: vec![topic],
                ..Default::default()
            },
        );
        assert_eq!(
            AggregatorEvent::decode(&log).unwrap(),
            AggregatorEvent::Unrecognized(Some(topic))
        );
    }

    #[test]
    fn classifies_log_without_topics() {
        let log = EthLog::new(1, 0, 0, Log::default());
        assert_eq!(
            AggregatorEvent::decode(&log).unwrap(),
            AggregatorEvent::Unrecognized(None)
        );
    }

    #[test]
    fn rejects_truncated_config_set_payload() {
        let log = EthLog::new(
            1,
            0,
            0,
            Log {
                address: Address::zero(),
                topics: vec![*CONFIG_SET_TOPIC],
                data: vec![0u8; 7].into(),
                ..Default::default()
            },
        );
        let err = AggregatorEvent::decode(&log).unwrap_err();
        assert!(matches!(
            err,
            EventError::Malformed {
                event: "ConfigSet",
                ..
            }
        ));
    }

    #[test]
    fn rejects_round_requested_without_requester_topic() {
        let log = EthLog::new(
            1,
            0,
            0,
            Log {
                address: Address::zero(),
                topics: vec![*ROUND_REQUESTED_TOPIC],
                ..Default::default()
            },
        );
        let err = AggregatorEvent::decode(&log).unwrap_err();
        assert!(matches!(
            err,
            EventError::Malformed {
                event: "RoundRequested",
                ..
            }
        ));
    }

    #[test]
    fn address_topic_round_trips() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(address_from_topic(&address_to_topic(address)), address);
    }

    #[test]
    fn topics_are_distinct() {
        assert_ne!(*CONFIG_SET_TOPIC, *ROUND_REQUESTED_TOPIC);
    }
}
