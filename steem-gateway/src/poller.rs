//! Poll driver and health probe.
//!
//! The poll driver is the single internal consumer of head state: every
//! period it refreshes the head slot, and when the head height advances it
//! fans the change out to subscribers. Derived artifacts (header, full
//! block, operations) are fetched through the dispatcher's cached helpers,
//! and only for feeds that currently have subscribers, so an idle gateway
//! costs one upstream call per period.
//!
//! If the driver coalesces multiple head advances into one period,
//! intermediate heights are skipped; per feed, delivery is in
//! non-decreasing head order.
//!
//! The health probe is independent: a cheap head call on the pool every
//! probe period, forcing a failover when it fails. Slow responses update
//! the endpoint's latency estimate through the pool's normal bookkeeping
//! and are only logged.

use std::sync::Arc;

use serde_json::json;
use tokio::time::{Instant, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use steem_rpc::DynamicGlobalProperties;
use steem_rpc::types::methods;

use crate::dispatcher;
use crate::protocol::{BroadcastFrame, Feed, SubscriptionUpdateFrame};
use crate::server::AppState;

// ═══════════════════════════════════════════════════════════════════════════════
// POLL DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodic head-state poller and fan-out driver.
#[derive(Debug)]
pub struct PollDriver {
    state: Arc<AppState>,
    last_head: Option<u64>,
}

impl PollDriver {
    /// Create a driver over the shared state.
    #[must_use]
    pub const fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            last_head: None,
        }
    }

    /// Run until `shutdown` fires. The driver never exits on its own: every
    /// upstream failure rotates endpoints and waits for the next tick.
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = interval(self.state.settings.poller.poll_interval());
        // The first interval tick completes immediately; consume it so the
        // first poll lands one full period after startup.
        ticker.tick().await;
        info!(
            interval_ms = self.state.settings.poller.poll_interval_ms,
            "Poll driver started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Poll driver stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll period: refresh head state, detect change, fan out.
    async fn tick(&mut self) {
        let caller = self.state.caller.clone();
        let head = self
            .state
            .cache
            .head_state(|| async move { caller.dynamic_global_properties().await })
            .await;

        let props = match head {
            Ok(props) => props,
            Err(err) => {
                warn!(error = %err, "Head refresh failed, rotating endpoint");
                self.state.caller.rotate();
                return;
            }
        };

        let height = props.head_block_number;
        if self.last_head == Some(height) {
            self.check_witnesses().await;
            return;
        }

        debug!(
            height,
            previous = ?self.last_head,
            "Head advanced"
        );
        self.last_head = Some(height);
        self.fan_out_head(&props).await;
        self.check_witnesses().await;
    }

    /// Deliver a head change to every interested party.
    async fn fan_out_head(&self, props: &DynamicGlobalProperties) {
        let Ok(data) = props.to_value() else { return };
        let height = props.head_block_number;
        let subscriptions = &self.state.subscriptions;

        if subscriptions.subscriber_count(Feed::GlobalProperties) > 0 {
            let frame = SubscriptionUpdateFrame::new(Feed::GlobalProperties, data.clone());
            if let Ok(text) = serde_json::to_string(&frame) {
                subscriptions.broadcast(Feed::GlobalProperties, &text);
            }
        }

        // Derived artifacts are fetched only for feeds somebody listens to.
        if subscriptions.subscriber_count(Feed::BlockHeaders) > 0 {
            match dispatcher::fetch_block_header(&self.state, height).await {
                Ok(header) => {
                    let frame = SubscriptionUpdateFrame::new(Feed::BlockHeaders, header);
                    if let Ok(text) = serde_json::to_string(&frame) {
                        subscriptions.broadcast(Feed::BlockHeaders, &text);
                    }
                }
                Err(err) => warn!(height, error = %err, "Header fetch for fan-out failed"),
            }
        }

        if subscriptions.subscriber_count(Feed::Blocks) > 0 {
            match dispatcher::fetch_block(&self.state, height).await {
                Ok(block) => {
                    let frame = SubscriptionUpdateFrame::new(Feed::Blocks, block);
                    if let Ok(text) = serde_json::to_string(&frame) {
                        subscriptions.broadcast(Feed::Blocks, &text);
                    }
                }
                Err(err) => warn!(height, error = %err, "Block fetch for fan-out failed"),
            }
        }

        if subscriptions.subscriber_count(Feed::Operations) > 0 {
            match dispatcher::fetch_ops(&self.state, height, false).await {
                Ok(ops) => {
                    let frame = SubscriptionUpdateFrame::new(Feed::Operations, ops);
                    if let Ok(text) = serde_json::to_string(&frame) {
                        subscriptions.broadcast(Feed::Operations, &text);
                    }
                }
                Err(err) => warn!(height, error = %err, "Ops fetch for fan-out failed"),
            }
        }

        // Legacy path: open sessions that are NOT global_properties
        // subscribers get the backward-compatible broadcast frame, so every
        // session sees exactly one frame per head change.
        let subscribers = subscriptions.subscriber_ids(Feed::GlobalProperties);
        let legacy = BroadcastFrame::global_properties_update(data);
        if let Ok(text) = serde_json::to_string(&legacy) {
            let delivered = self.state.sessions.broadcast_except(&subscribers, &text);
            debug!(height, delivered, "Legacy broadcast sent");
        }
    }

    /// Refresh the witness list through its TTL and broadcast on change.
    ///
    /// Change detection is by deep comparison against the previously cached
    /// list. Skipped entirely while the feed has no subscribers.
    async fn check_witnesses(&self) {
        if self
            .state
            .subscriptions
            .subscriber_count(Feed::Witnesses)
            == 0
        {
            return;
        }

        let previous = self.state.cache.peek_witnesses().map(|(list, _)| list);

        let caller = self.state.caller.clone();
        let current = match self
            .state
            .cache
            .active_witnesses(|| async move { caller.active_witnesses().await })
            .await
        {
            Ok(list) => list,
            Err(err) => {
                warn!(error = %err, "Witness refresh failed");
                return;
            }
        };

        if previous.as_ref() != Some(&current) {
            debug!(count = current.len(), "Witness list changed");
            let frame = SubscriptionUpdateFrame::new(Feed::Witnesses, json!(current));
            if let Ok(text) = serde_json::to_string(&frame) {
                self.state.subscriptions.broadcast(Feed::Witnesses, &text);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH PROBE
// ═══════════════════════════════════════════════════════════════════════════════

/// Periodic upstream health probe.
#[derive(Debug)]
pub struct HealthProbe {
    state: Arc<AppState>,
}

impl HealthProbe {
    /// Create a probe over the shared state.
    #[must_use]
    pub const fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Run until `shutdown` fires.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.state.settings.poller.health_probe_interval());
        // Skip the immediate first tick; the pool starts with a clean record
        // and probing at startup would race the first client requests.
        ticker.tick().await;
        info!(
            interval_ms = self.state.settings.poller.health_probe_interval_ms,
            "Health probe started"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Health probe stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.probe().await;
                }
            }
        }
    }

    /// One probe: a cheap head call directly on the pool.
    ///
    /// Failure forces a failover. A slow response has already updated the
    /// endpoint's latency estimate through the pool; it is logged here but
    /// does not rotate by itself.
    async fn probe(&self) {
        let started = Instant::now();
        let result = self
            .state
            .pool
            .call(methods::GET_DYNAMIC_GLOBAL_PROPERTIES, json!([]))
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(_) => {
                if elapsed > self.state.settings.poller.slow_response_threshold() {
                    warn!(
                        latency_ms = elapsed.as_millis() as u64,
                        endpoint = %self.state.pool.current_endpoint().1,
                        "Health probe slow"
                    );
                } else {
                    debug!(latency_ms = elapsed.as_millis() as u64, "Health probe ok");
                }
            }
            Err(err) => {
                warn!(error = %err, "Health probe failed, forcing failover");
                self.state.caller.rotate();
            }
        }
    }
}
