// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The contract tracker: one instance per monitored contract/job pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Filter;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ocr_types::{ConfigDigest, ContractConfig, EthLog, Head, RoundRequested};

use crate::broadcast::{HeadReceiver, LogBroadcaster, LogFilterSpec, LogListener, LogSubscription};
use crate::client::{BlockTranslator, ChainClient, ConfigDetails};
use crate::config::TrackerConfig;
use crate::error::{EventError, RpcError, TrackerError, TrackerResult};
use crate::events::{AggregatorEvent, CONFIG_SET_TOPIC, ROUND_REQUESTED_TOPIC};
use crate::mailbox::Mailbox;
use crate::metrics::TrackerMetrics;
use crate::store::TrackerStore;

/// Sentinel meaning "no header observed yet".
const HEIGHT_UNKNOWN: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Running,
    Stopped,
}

struct Lifecycle {
    state: LifecycleState,
    relay_pump: Option<JoinHandle<()>>,
    head_listener: Option<JoinHandle<()>>,
    log_subscription: Option<LogSubscription>,
    config_tx: Option<mpsc::Sender<ContractConfig>>,
}

/// Tracks one aggregator contract for one job: keeps the latest known round
/// request and block height under concurrent access, relays configuration
/// changes to the consensus engine through a bounded mailbox, and answers
/// the engine's queries.
///
/// `handle_log` is invoked serially by the log broadcaster and must not be
/// called concurrently for the same instance. Query methods may be called
/// concurrently with everything else, but are only meaningful between
/// [`start`](Self::start) and [`stop`](Self::stop); results outside that
/// window are stale, not guarded against.
pub struct ContractTracker<C, S, L, T> {
    cfg: TrackerConfig,
    client: Arc<C>,
    store: Arc<S>,
    log_broadcaster: Arc<L>,
    block_translator: T,
    heads: HeadReceiver,
    metrics: Arc<TrackerMetrics>,

    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,

    latest_round_requested: RwLock<RoundRequested>,
    latest_block_height: RwLock<i64>,

    configs: Arc<Mailbox<ContractConfig>>,
    config_rx: parking_lot::Mutex<Option<mpsc::Receiver<ContractConfig>>>,
}

impl<C, S, L, T> ContractTracker<C, S, L, T>
where
    C: ChainClient + 'static,
    S: TrackerStore + 'static,
    L: LogBroadcaster + 'static,
    T: BlockTranslator + 'static,
{
    pub fn new(
        cfg: TrackerConfig,
        client: Arc<C>,
        store: Arc<S>,
        log_broadcaster: Arc<L>,
        block_translator: T,
        heads: HeadReceiver,
        metrics: Arc<TrackerMetrics>,
    ) -> TrackerResult<Self> {
        cfg.validate()?;
        let (config_tx, config_rx) = mpsc::channel(1);
        Ok(Self {
            configs: Arc::new(Mailbox::new(cfg.config_mailbox_capacity)),
            cfg,
            client,
            store,
            log_broadcaster,
            block_translator,
            heads,
            metrics,
            cancel: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Idle,
                relay_pump: None,
                head_listener: None,
                log_subscription: None,
                config_tx: Some(config_tx),
            }),
            latest_round_requested: RwLock::new(RoundRequested::default()),
            latest_block_height: RwLock::new(HEIGHT_UNKNOWN),
            config_rx: parking_lot::Mutex::new(Some(config_rx)),
        })
    }

    /// Hand-off stream of configuration values, available once. The channel
    /// closes when the tracker stops. Consuming it is optional - the polling
    /// queries alone are sufficient.
    pub fn config_updates(&self) -> Option<mpsc::Receiver<ContractConfig>> {
        self.config_rx.lock().take()
    }

    /// Loads persisted state, registers for log delivery and header pushes,
    /// and launches the relay pump. Idempotent while running; a stopped
    /// tracker cannot be restarted.
    pub async fn start(self: &Arc<Self>) -> TrackerResult<()> {
        let mut life = self.lifecycle.lock().await;
        match life.state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Stopped => return Err(TrackerError::Stopped),
            LifecycleState::Idle => {}
        }

        if let Some(loaded) = self.store.load_latest_round_requested().await? {
            debug!(
                job_id = self.cfg.job_id,
                epoch = loaded.epoch,
                round = loaded.round,
                "restored persisted round request"
            );
            *self.latest_round_requested.write().await = loaded;
        }

        let subscription = self
            .log_broadcaster
            .register(
                LogFilterSpec {
                    contract: self.cfg.contract_address,
                    topics: vec![*CONFIG_SET_TOPIC, *ROUND_REQUESTED_TOPIC],
                    required_confirmations: self.cfg.required_confirmations,
                },
                Arc::clone(self) as Arc<dyn LogListener>,
            )
            .await?;
        life.log_subscription = Some(subscription);

        let mut heads_rx = self.heads.clone();
        let seed = *heads_rx.borrow_and_update();
        if let Some(head) = seed {
            self.observe_head(&head).await;
        }
        let head_tracker = Arc::clone(self);
        let head_cancel = self.cancel.clone();
        life.head_listener = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = head_cancel.cancelled() => return,
                    changed = heads_rx.changed() => {
                        if changed.is_err() {
                            debug!(job_id = head_tracker.cfg.job_id, "header feed closed");
                            return;
                        }
                        let head = *heads_rx.borrow_and_update();
                        if let Some(head) = head {
                            head_tracker.observe_head(&head).await;
                        }
                    }
                }
            }
        }));

        let Some(config_tx) = life.config_tx.clone() else {
            return Err(TrackerError::Stopped);
        };
        let mailbox = Arc::clone(&self.configs);
        let pump_cancel = self.cancel.clone();
        let job_id = self.cfg.job_id;
        life.relay_pump = Some(tokio::spawn(async move {
            relay_pump(mailbox, config_tx, pump_cancel, job_id).await;
        }));

        life.state = LifecycleState::Running;
        info!(
            job_id = self.cfg.job_id,
            contract = ?self.cfg.contract_address,
            "contract tracker started"
        );
        Ok(())
    }

    /// Cancels the background tasks, waits for them to exit, releases the
    /// log subscription, and closes the hand-off channel. Idempotent; the
    /// Stopped state is terminal.
    pub async fn stop(&self) -> TrackerResult<()> {
        let mut life = self.lifecycle.lock().await;
        if life.state != LifecycleState::Running {
            return Ok(());
        }

        self.cancel.cancel();
        if let Some(handle) = life.relay_pump.take() {
            if let Err(e) = handle.await {
                error!(job_id = self.cfg.job_id, error = %e, "relay pump task failed");
            }
        }
        if let Some(handle) = life.head_listener.take() {
            if let Err(e) = handle.await {
                error!(job_id = self.cfg.job_id, error = %e, "head listener task failed");
            }
        }
        if let Some(subscription) = life.log_subscription.take() {
            subscription.unsubscribe();
        }
        life.config_tx = None;
        life.state = LifecycleState::Stopped;
        info!(job_id = self.cfg.job_id, "contract tracker stopped");
        Ok(())
    }

    /// The contract's current `latestConfigDetails()`.
    pub async fn latest_config_details(&self) -> TrackerResult<ConfigDetails> {
        self.with_query_context(self.client.latest_config_details())
            .await
    }

    /// Fetches and decodes the `ConfigSet` log emitted in `changed_in_block`.
    /// Errors if the translated range holds no matching logs.
    pub async fn latest_config(&self, changed_in_block: u64) -> TrackerResult<ContractConfig> {
        let (from_block, to_block) = self
            .block_translator
            .number_to_query_range(changed_in_block);
        let filter = Filter::new()
            .address(self.cfg.contract_address)
            .topic0(*CONFIG_SET_TOPIC)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .with_query_context(self.client.filter_logs(&filter))
            .await?;
        let Some(last) = logs.last() else {
            return Err(TrackerError::NoConfigLogs(self.cfg.contract_address));
        };
        if last.address() != self.cfg.contract_address {
            return Err(TrackerError::AddressMismatch {
                actual: last.address(),
                expected: self.cfg.contract_address,
            });
        }
        match AggregatorEvent::decode(last)? {
            AggregatorEvent::ConfigSet(config) => Ok(config),
            _ => Err(TrackerError::Decode(EventError::Malformed {
                event: "ConfigSet",
                reason: "filtered log does not carry the ConfigSet topic".into(),
            })),
        }
    }

    /// Highest known block height. Falls back to an on-chain head lookup
    /// until the first header push arrives. Chains without meaningful height
    /// semantics report zero unconditionally.
    pub async fn latest_block_height(&self) -> TrackerResult<u64> {
        if !self.cfg.chain_kind.tracks_block_height() {
            return Ok(0);
        }
        let latest = *self.latest_block_height.read().await;
        if latest >= 0 {
            return Ok(latest as u64);
        }

        debug!(
            job_id = self.cfg.job_id,
            "still waiting for first head, falling back to on-chain lookup"
        );
        let head = self
            .with_query_context(self.client.head_by_number(None))
            .await?
            .ok_or(TrackerError::MissingHead)?;
        Ok(head.effective_height())
    }

    /// The latest round request observed for this contract. Zero values mean
    /// none has ever been observed - a valid steady state, not an error.
    /// `lookback` is accepted for interface compatibility and does not
    /// currently narrow the answer.
    pub async fn latest_round_requested(
        &self,
        _lookback: Duration,
    ) -> TrackerResult<(ConfigDigest, u32, u8)> {
        let latest = self.latest_round_requested.read().await;
        Ok((latest.config_digest, latest.epoch, latest.round))
    }

    async fn observe_head(&self, head: &Head) {
        let height = head.effective_height() as i64;
        let mut latest = self.latest_block_height.write().await;
        if height > *latest {
            *latest = height;
            self.metrics.latest_block_height.set(height);
        }
    }

    async fn mark_consumed_logging_errors(&self, log: &EthLog) {
        if let Err(e) = self.log_broadcaster.mark_consumed(log).await {
            error!(
                job_id = self.cfg.job_id,
                error = %e,
                coords = ?log.coords(),
                "failed to mark log consumed"
            );
        }
    }

    /// Runs an on-chain query under the combined context: the tracker's own
    /// lifetime and the configured RPC deadline.
    async fn with_query_context<F, O>(&self, query: F) -> TrackerResult<O>
    where
        F: std::future::Future<Output = Result<O, RpcError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TrackerError::Shutdown),
            outcome = tokio::time::timeout(self.cfg.rpc_deadline, query) => match outcome {
                Ok(inner) => inner.map_err(TrackerError::from),
                Err(_) => Err(TrackerError::Deadline(self.cfg.rpc_deadline)),
            },
        }
    }
}

#[async_trait]
impl<C, S, L, T> LogListener for ContractTracker<C, S, L, T>
where
    C: ChainClient + 'static,
    S: TrackerStore + 'static,
    L: LogBroadcaster + 'static,
    T: BlockTranslator + 'static,
{
    async fn handle_log(&self, log: EthLog) {
        match self.log_broadcaster.was_already_consumed(&log).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                error!(
                    job_id = self.cfg.job_id,
                    error = %e,
                    coords = ?log.coords(),
                    "could not determine if log was already consumed"
                );
                return;
            }
        }

        // Upstream filtering should make this impossible.
        if log.address() != self.cfg.contract_address {
            error!(
                job_id = self.cfg.job_id,
                actual = ?log.address(),
                expected = ?self.cfg.contract_address,
                "log address does not match configured contract"
            );
            self.mark_consumed_logging_errors(&log).await;
            return;
        }

        let event = match AggregatorEvent::decode(&log) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    job_id = self.cfg.job_id,
                    error = %e,
                    coords = ?log.coords(),
                    "could not decode contract log"
                );
                self.mark_consumed_logging_errors(&log).await;
                return;
            }
        };

        let mut consumed = false;
        match event {
            AggregatorEvent::ConfigSet(config) => {
                self.metrics
                    .logs_handled
                    .with_label_values(&["config-set"])
                    .inc();
                if self.configs.deliver(config) {
                    self.metrics.config_mailbox_overflows.inc();
                    error!(
                        job_id = self.cfg.job_id,
                        "config mailbox is over capacity - dropped the oldest unprocessed item"
                    );
                }
            }
            AggregatorEvent::RoundRequested(round) => {
                self.metrics
                    .logs_handled
                    .with_label_values(&["round-requested"])
                    .inc();
                let current_raw = self.latest_round_requested.read().await.raw;
                if round.raw.is_later_than(&current_raw) {
                    if let Err(e) = self.store.save_latest_round_requested(&round, &log).await {
                        // The log stays eligible for redelivery; the
                        // comparator or the marker will settle it then.
                        error!(
                            job_id = self.cfg.job_id,
                            error = %e,
                            coords = ?log.coords(),
                            "could not persist round request"
                        );
                        return;
                    }
                    consumed = true;
                    *self.latest_round_requested.write().await = round.clone();
                    info!(
                        job_id = self.cfg.job_id,
                        digest = %round.config_digest,
                        epoch = round.epoch,
                        round = round.round,
                        "received new latest round request"
                    );
                } else {
                    self.metrics.stale_round_requests.inc();
                    warn!(
                        job_id = self.cfg.job_id,
                        incoming = ?round.raw,
                        current = ?current_raw,
                        "ignoring out of date round request"
                    );
                }
            }
            AggregatorEvent::Unrecognized(topic) => {
                self.metrics
                    .logs_handled
                    .with_label_values(&["unrecognized"])
                    .inc();
                debug!(
                    job_id = self.cfg.job_id,
                    topic = ?topic,
                    "got unrecognized log topic"
                );
            }
        }

        if !consumed {
            self.mark_consumed_logging_errors(&log).await;
        }
    }

    fn job_id(&self) -> i32 {
        self.cfg.job_id
    }
}

/// Drains the config mailbox into the hand-off channel. The consensus engine
/// may take arbitrarily long per value; this task plus the mailbox keep
/// `handle_log` from ever waiting on it.
async fn relay_pump(
    mailbox: Arc<Mailbox<ContractConfig>>,
    config_tx: mpsc::Sender<ContractConfig>,
    cancel: CancellationToken,
    job_id: i32,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = mailbox.notified() => {
                while let Some(config) = mailbox.retrieve() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = config_tx.send(config) => {
                            if sent.is_err() {
                                debug!(job_id, "config hand-off channel closed, pump exiting");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
