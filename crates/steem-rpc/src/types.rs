//! Request and response types for condenser-API RPC methods.
//!
//! This module defines:
//!
//! - [`methods`] - Upstream method-name constants
//! - [`DynamicGlobalProperties`] - The head-state payload, typed just enough
//!   for change detection
//! - The internal JSON-RPC request/response envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ═══════════════════════════════════════════════════════════════════════════════
// METHOD NAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Upstream condenser-API method names.
///
/// These are the fully-qualified names sent on the wire to the upstream
/// endpoint. The gateway's own wire protocol accepts both bare and prefixed
/// forms from clients; the upstream always receives the qualified form.
pub mod methods {
    /// Current head block height and network counters.
    pub const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";
    /// Header of a single block.
    pub const GET_BLOCK_HEADER: &str = "condenser_api.get_block_header";
    /// Full contents of a single block.
    pub const GET_BLOCK: &str = "condenser_api.get_block";
    /// Operations contained in a single block.
    pub const GET_OPS_IN_BLOCK: &str = "condenser_api.get_ops_in_block";
    /// Currently active witness account names.
    pub const GET_ACTIVE_WITNESSES: &str = "condenser_api.get_active_witnesses";
    /// A single transaction by id.
    pub const GET_TRANSACTION: &str = "condenser_api.get_transaction";
}

// ═══════════════════════════════════════════════════════════════════════════════
// DYNAMIC GLOBAL PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

/// The head-state object returned by `get_dynamic_global_properties`.
///
/// Only `head_block_number` is typed: the poll driver compares it against the
/// last observed height to detect new blocks. Every other field the upstream
/// returns is preserved verbatim in `extra` and round-trips through
/// serialization, so clients see the full upstream object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicGlobalProperties {
    /// Height of the current head block.
    pub head_block_number: u64,

    /// All remaining upstream fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DynamicGlobalProperties {
    /// Render the full object back to a JSON value for fan-out.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (it cannot for this shape,
    /// but the signature keeps the call sites honest).
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERNAL TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC response wrapper for extracting result or error.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    pub id: u64,
    pub result: Option<T>,
    pub error: Option<crate::error::RpcErrorDetail>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
