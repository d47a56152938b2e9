//! Retrying caller over the upstream pool.
//!
//! Wraps [`UpstreamPool`] with up to N attempts per logical call. Between
//! attempts the pool fails over and the caller sleeps `attempt * base`
//! (linear backoff). The final attempt's error propagates unchanged.
//!
//! Whenever a failover actually switches endpoints, the gateway caches are
//! dropped: a different endpoint may disagree on not-yet-irreversible
//! heights.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, warn};

use steem_rpc::types::methods;
use steem_rpc::{DynamicGlobalProperties, RpcError};

use crate::cache::GatewayCache;
use crate::upstream::UpstreamPool;

// ═══════════════════════════════════════════════════════════════════════════════
// RETRYING CALLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded-retry, rotating wrapper around the upstream pool.
///
/// Cheap to clone; shared by the dispatcher and the poll driver.
#[derive(Debug, Clone)]
pub struct RetryingCaller {
    pool: Arc<UpstreamPool>,
    cache: Arc<GatewayCache>,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryingCaller {
    /// Create a caller over a pool and the caches it must drop on failover.
    #[must_use]
    pub const fn new(
        pool: Arc<UpstreamPool>,
        cache: Arc<GatewayCache>,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            pool,
            cache,
            max_attempts,
            base_delay,
        }
    }

    /// Rotate the pool to a different endpoint, dropping caches on a switch.
    ///
    /// Used between retry attempts, by the dispatcher's error path for
    /// network/timeout failures, and by the health probe.
    pub fn rotate(&self) {
        if self.pool.failover() {
            self.cache.clear_all();
        }
    }

    /// Call a named method with retries and rotation.
    ///
    /// # Errors
    ///
    /// The last attempt's error, unchanged.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let mut attempt = 1u32;

        loop {
            match self.pool.call(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            method,
                            attempts = attempt,
                            error = %err,
                            "Upstream call failed after all attempts"
                        );
                        return Err(err);
                    }

                    debug!(
                        method,
                        attempt,
                        error = %err,
                        "Upstream call failed, rotating and retrying"
                    );
                    self.rotate();
                    tokio::time::sleep(self.base_delay * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TYPED READS
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch the current head state.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn dynamic_global_properties(&self) -> Result<DynamicGlobalProperties, RpcError> {
        let value = self
            .call(methods::GET_DYNAMIC_GLOBAL_PROPERTIES, json!([]))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a block header.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn block_header(&self, height: u64) -> Result<Value, RpcError> {
        self.call(methods::GET_BLOCK_HEADER, json!([height])).await
    }

    /// Fetch a full block.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn block(&self, height: u64) -> Result<Value, RpcError> {
        self.call(methods::GET_BLOCK, json!([height])).await
    }

    /// Fetch the operations in a block.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn ops_in_block(&self, height: u64, only_virtual: bool) -> Result<Value, RpcError> {
        self.call(methods::GET_OPS_IN_BLOCK, json!([height, only_virtual]))
            .await
    }

    /// Fetch the active witness list.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn active_witnesses(&self) -> Result<Vec<String>, RpcError> {
        let value = self.call(methods::GET_ACTIVE_WITNESSES, json!([])).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a transaction by id.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn transaction(&self, transaction_id: &str) -> Result<Value, RpcError> {
        self.call(methods::GET_TRANSACTION, json!([transaction_id]))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
