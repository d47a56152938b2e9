//! Steem condenser-API JSON-RPC client.
//!
//! This module provides [`SteemRpcClient`], the low-level entry point for
//! talking to a single condenser-API endpoint.
//!
//! # Example
//!
//! ```ignore
//! use steem_rpc::{SteemRpcClient, ClientConfig};
//!
//! let client = SteemRpcClient::new("https://api.steemit.com")?;
//!
//! let props = client.get_dynamic_global_properties().await?;
//! let header = client.get_block_header(props.head_block_number).await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::types::{DynamicGlobalProperties, JsonRpcRequest, JsonRpcResponse, methods};

// ═══════════════════════════════════════════════════════════════════════════════
// STEEM RPC CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-RPC client for a single condenser-API endpoint.
///
/// One instance per endpoint URL. The generic [`call`](Self::call) primitive
/// sends any named method; the typed helpers cover the read set the gateway
/// serves.
///
/// # Thread Safety
///
/// This client is `Send + Sync` and can be shared across tasks. The internal
/// `reqwest::Client` is designed for concurrent use.
#[derive(Debug)]
pub struct SteemRpcClient {
    /// HTTP client for JSON-RPC requests.
    client: reqwest::Client,

    /// RPC endpoint URL.
    endpoint: String,

    /// Request ID counter for JSON-RPC correlation.
    request_id: AtomicU64,
}

impl SteemRpcClient {
    /// Create a new client with default configuration.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - HTTP URL of the condenser-API endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    /// Create a new client with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or if the
    /// configuration is invalid.
    pub fn with_config(endpoint: impl Into<String>, config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RpcError::Connection(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            request_id: AtomicU64::new(1),
        })
    }

    /// Get the endpoint URL this client is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the next request ID for JSON-RPC correlation.
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // GENERIC CALL PRIMITIVE
    // ───────────────────────────────────────────────────────────────────────────

    /// Call a named method and return the raw `result` value.
    ///
    /// # Errors
    ///
    /// - Network and HTTP transport failures ([`RpcError::is_network`])
    /// - [`RpcError::Rpc`] when the server returns an error object
    /// - [`RpcError::InvalidResponse`] when the response has neither a
    ///   result nor an error
    #[instrument(skip(self, params), fields(endpoint = %self.endpoint))]
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request_id = self.next_request_id();
        let request = JsonRpcRequest::new(method, params, request_id);

        debug!(method, request_id, "Sending RPC request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http(format!(
                "{} returned status {status}",
                self.endpoint
            )));
        }

        let body: JsonRpcResponse<Value> = response.json().await?;

        if let Some(error) = body.error {
            return Err(error.into_error());
        }

        body.result
            .ok_or_else(|| RpcError::InvalidResponse("Missing result in RPC response".into()))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TYPED CONDENSER READS
    // ───────────────────────────────────────────────────────────────────────────

    /// Fetch the current head state.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call); additionally fails if the result does not
    /// carry a numeric `head_block_number`.
    pub async fn get_dynamic_global_properties(&self) -> Result<DynamicGlobalProperties> {
        let value = self
            .call(methods::GET_DYNAMIC_GLOBAL_PROPERTIES, json!([]))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch the header of a single block.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_block_header(&self, height: u64) -> Result<Value> {
        self.call(methods::GET_BLOCK_HEADER, json!([height])).await
    }

    /// Fetch the full contents of a single block.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_block(&self, height: u64) -> Result<Value> {
        self.call(methods::GET_BLOCK, json!([height])).await
    }

    /// Fetch the operations in a single block.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_ops_in_block(&self, height: u64, only_virtual: bool) -> Result<Value> {
        self.call(methods::GET_OPS_IN_BLOCK, json!([height, only_virtual]))
            .await
    }

    /// Fetch the currently active witness account names.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call); additionally fails if the result is not an
    /// array of strings.
    pub async fn get_active_witnesses(&self) -> Result<Vec<String>> {
        let value = self.call(methods::GET_ACTIVE_WITNESSES, json!([])).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a single transaction by id.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get_transaction(&self, transaction_id: &str) -> Result<Value> {
        self.call(methods::GET_TRANSACTION, json!([transaction_id]))
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
