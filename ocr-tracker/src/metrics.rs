// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

#[derive(Clone, Debug)]
pub struct TrackerMetrics {
    pub(crate) logs_handled: IntCounterVec,
    pub(crate) stale_round_requests: IntCounter,
    pub(crate) config_mailbox_overflows: IntCounter,
    pub(crate) latest_block_height: IntGauge,
}

impl TrackerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            logs_handled: register_int_counter_vec_with_registry!(
                "ocr_tracker_logs_handled",
                "Contract logs handled, by decoded event kind",
                &["event"],
                registry,
            )
            .unwrap(),
            stale_round_requests: register_int_counter_with_registry!(
                "ocr_tracker_stale_round_requests",
                "Round-request events discarded as out of date",
                registry,
            )
            .unwrap(),
            config_mailbox_overflows: register_int_counter_with_registry!(
                "ocr_tracker_config_mailbox_overflows",
                "Config deliveries that evicted the oldest pending config",
                registry,
            )
            .unwrap(),
            latest_block_height: register_int_gauge_with_registry!(
                "ocr_tracker_latest_block_height",
                "Highest block height observed from the header feed",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
