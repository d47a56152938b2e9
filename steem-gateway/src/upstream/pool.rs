//! Upstream endpoint pool with per-endpoint health tracking.
//!
//! The pool presents a single `call(method, params)` primitive. The current
//! endpoint is sticky: it only changes through [`UpstreamPool::failover`],
//! which ranks the eligible endpoints by health. Selection policy:
//!
//! 1. Filter to endpoints that are marked healthy, or whose last error is
//!    older than the recovery window.
//! 2. Rank survivors by (healthy first, then lower error count, then lower
//!    average latency).
//! 3. If the filter leaves nothing, retain the current endpoint.
//!
//! Health state lives behind one `RwLock`; the lock is taken briefly before
//! and after an upstream call and never held across the await.

use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use steem_rpc::{ClientConfig, RpcError, SteemRpcClient};

use crate::error::{GatewayError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// ENDPOINT HEALTH
// ═══════════════════════════════════════════════════════════════════════════════

/// Mutable health record for one endpoint.
#[derive(Debug, Clone)]
struct EndpointHealth {
    healthy: bool,
    error_count: u64,
    last_error: Option<Instant>,
    last_success: Option<Instant>,
    /// Rolling average latency in milliseconds over successful calls.
    avg_latency_ms: f64,
    /// Successful calls; the divisor of the rolling average.
    total_requests: u64,
}

impl EndpointHealth {
    const fn new() -> Self {
        Self {
            healthy: true,
            error_count: 0,
            last_error: None,
            last_success: None,
            avg_latency_ms: 0.0,
            total_requests: 0,
        }
    }

    #[allow(clippy::cast_precision_loss)] // request counts stay far below 2^52
    fn record_success(&mut self, latency: Duration) {
        self.healthy = true;
        self.last_success = Some(Instant::now());
        self.total_requests += 1;

        let sample = latency.as_secs_f64() * 1000.0;
        let n = self.total_requests as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + sample) / n;
    }

    fn record_failure(&mut self) {
        self.healthy = false;
        self.error_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// Eligible for selection: healthy, or past the recovery window.
    fn is_eligible(&self, recovery_window: Duration, now: Instant) -> bool {
        if self.healthy {
            return true;
        }
        self.last_error
            .is_none_or(|at| now.duration_since(at) > recovery_window)
    }
}

/// Read-only view of one endpoint's health, for `/status`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSnapshot {
    /// Endpoint URL.
    pub url: String,
    /// Whether the last call succeeded.
    pub healthy: bool,
    /// Total failed calls.
    pub error_count: u64,
    /// Total successful calls.
    pub total_requests: u64,
    /// Rolling average latency over successful calls, in milliseconds.
    pub avg_latency_ms: f64,
    /// Seconds since the last error, if any.
    pub last_error_secs_ago: Option<u64>,
    /// Seconds since the last success, if any.
    pub last_success_secs_ago: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// UPSTREAM POOL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct PoolState {
    endpoints: Vec<EndpointHealth>,
    current: usize,
}

/// Ordered pool of condenser-API endpoints with health-based failover.
#[derive(Debug)]
pub struct UpstreamPool {
    /// One client per endpoint, index-aligned with the health records.
    clients: Vec<SteemRpcClient>,
    urls: Vec<String>,
    state: RwLock<PoolState>,
    recovery_window: Duration,
}

impl UpstreamPool {
    /// Build a pool from an ordered endpoint list.
    ///
    /// The first endpoint is the initial current endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or a client cannot be built.
    pub fn new(
        endpoints: &[String],
        client_config: &ClientConfig,
        recovery_window: Duration,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "upstream.endpoints cannot be empty".into(),
            ));
        }

        let clients = endpoints
            .iter()
            .map(|url| SteemRpcClient::with_config(url.clone(), client_config.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let health = endpoints.iter().map(|_| EndpointHealth::new()).collect();

        Ok(Self {
            clients,
            urls: endpoints.to_vec(),
            state: RwLock::new(PoolState {
                endpoints: health,
                current: 0,
            }),
            recovery_window,
        })
    }

    /// Number of configured endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.clients.len()
    }

    /// Index and URL of the current endpoint.
    #[must_use]
    pub fn current_endpoint(&self) -> (usize, String) {
        let index = self.state.read().current;
        (index, self.urls[index].clone())
    }

    /// Call a named method on the current endpoint, recording health.
    ///
    /// # Errors
    ///
    /// Propagates the upstream error unchanged; the health record of the
    /// endpoint is updated either way.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, RpcError> {
        let index = self.state.read().current;
        let client = &self.clients[index];

        let started = Instant::now();
        let result = client.call(method, params).await;
        let elapsed = started.elapsed();

        let mut state = self.state.write();
        match &result {
            Ok(_) => {
                state.endpoints[index].record_success(elapsed);
                debug!(
                    endpoint = %self.urls[index],
                    latency_ms = elapsed.as_millis() as u64,
                    method,
                    "Upstream call succeeded"
                );
            }
            Err(err) => {
                state.endpoints[index].record_failure();
                warn!(
                    endpoint = %self.urls[index],
                    method,
                    error = %err,
                    "Upstream call failed"
                );
            }
        }

        result
    }

    /// Rotate to the best eligible endpoint other than the current one.
    ///
    /// Returns `true` if the current endpoint actually changed. Callers that
    /// observe a change are expected to drop dependent caches: a different
    /// endpoint may disagree on not-yet-irreversible heights.
    pub fn failover(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();
        let current = state.current;

        let mut candidates: Vec<usize> = (0..state.endpoints.len())
            .filter(|&i| i != current)
            .filter(|&i| state.endpoints[i].is_eligible(self.recovery_window, now))
            .collect();

        if candidates.is_empty() {
            debug!(endpoint = %self.urls[current], "No eligible endpoint to fail over to");
            return false;
        }

        candidates.sort_by(|&a, &b| {
            let ea = &state.endpoints[a];
            let eb = &state.endpoints[b];
            eb.healthy
                .cmp(&ea.healthy)
                .then(ea.error_count.cmp(&eb.error_count))
                .then(
                    ea.avg_latency_ms
                        .partial_cmp(&eb.avg_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });

        let next = candidates[0];
        state.current = next;
        info!(
            from = %self.urls[current],
            to = %self.urls[next],
            index = next,
            "Switched upstream endpoint"
        );
        true
    }

    /// Health snapshots for every endpoint, in configuration order.
    #[must_use]
    pub fn health_snapshot(&self) -> Vec<EndpointSnapshot> {
        let state = self.state.read();
        let now = Instant::now();

        state
            .endpoints
            .iter()
            .zip(&self.urls)
            .map(|(health, url)| EndpointSnapshot {
                url: url.clone(),
                healthy: health.healthy,
                error_count: health.error_count,
                total_requests: health.total_requests,
                avg_latency_ms: health.avg_latency_ms,
                last_error_secs_ago: health
                    .last_error
                    .map(|at| now.duration_since(at).as_secs()),
                last_success_secs_ago: health
                    .last_success
                    .map(|at| now.duration_since(at).as_secs()),
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn pool_for(urls: Vec<String>) -> UpstreamPool {
        UpstreamPool::new(&urls, &ClientConfig::default(), Duration::from_secs(60))
            .expect("pool creation failed")
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"head_block_number": 1}
            })))
            .mount(&server)
            .await;
        server
    }

    async fn failing_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn empty_endpoint_list_is_rejected() {
        let result = UpstreamPool::new(&[], &ClientConfig::default(), Duration::from_secs(60));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn success_updates_health() {
        let server = healthy_server().await;
        let pool = pool_for(vec![server.uri()]);

        pool.call("condenser_api.get_dynamic_global_properties", json!([]))
            .await
            .expect("call failed");

        let snapshot = &pool.health_snapshot()[0];
        assert!(snapshot.healthy);
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.error_count, 0);
        assert!(snapshot.last_success_secs_ago.is_some());
    }

    #[tokio::test]
    async fn failure_updates_health() {
        let server = failing_server().await;
        let pool = pool_for(vec![server.uri()]);

        let result = pool
            .call("condenser_api.get_dynamic_global_properties", json!([]))
            .await;
        assert!(result.is_err());

        let snapshot = &pool.health_snapshot()[0];
        assert!(!snapshot.healthy);
        assert_eq!(snapshot.error_count, 1);
        assert!(snapshot.last_error_secs_ago.is_some());
    }

    #[tokio::test]
    async fn rolling_average_latency() {
        let server = healthy_server().await;
        let pool = pool_for(vec![server.uri()]);

        for _ in 0..3 {
            pool.call("condenser_api.get_block", json!([1]))
                .await
                .expect("call failed");
        }

        let snapshot = &pool.health_snapshot()[0];
        assert_eq!(snapshot.total_requests, 3);
        assert!(snapshot.avg_latency_ms > 0.0);
    }

    #[tokio::test]
    async fn failover_targets_a_different_endpoint() {
        let bad = failing_server().await;
        let good = healthy_server().await;
        let pool = pool_for(vec![bad.uri(), good.uri()]);

        assert_eq!(pool.current_endpoint().0, 0);

        let _ = pool.call("condenser_api.get_block", json!([1])).await;
        assert!(pool.failover());
        assert_eq!(pool.current_endpoint().0, 1);

        pool.call("condenser_api.get_block", json!([1]))
            .await
            .expect("call on the healthy endpoint failed");
    }

    #[tokio::test]
    async fn failover_with_single_endpoint_is_a_no_op() {
        let server = failing_server().await;
        let pool = pool_for(vec![server.uri()]);

        let _ = pool.call("condenser_api.get_block", json!([1])).await;
        assert!(!pool.failover());
        assert_eq!(pool.current_endpoint().0, 0);
    }

    #[tokio::test]
    async fn failover_skips_recently_failed_endpoints() {
        let a = failing_server().await;
        let b = failing_server().await;
        let pool = pool_for(vec![a.uri(), b.uri()]);

        // Fail on endpoint 0, switch to endpoint 1, fail there too.
        let _ = pool.call("condenser_api.get_block", json!([1])).await;
        assert!(pool.failover());
        let _ = pool.call("condenser_api.get_block", json!([1])).await;

        // Both endpoints now have fresh errors; nothing is eligible.
        assert!(!pool.failover());
        assert_eq!(pool.current_endpoint().0, 1);
    }

    #[tokio::test]
    async fn failover_prefers_lower_error_count() {
        let a = failing_server().await;
        let b = healthy_server().await;
        let c = healthy_server().await;
        let pool = pool_for(vec![a.uri(), b.uri(), c.uri()]);

        // Give endpoint 2 a worse record than endpoint 1.
        {
            let mut state = pool.state.write();
            state.endpoints[2].error_count = 5;
        }

        let _ = pool.call("condenser_api.get_block", json!([1])).await;
        assert!(pool.failover());
        assert_eq!(pool.current_endpoint().0, 1);
    }
}
