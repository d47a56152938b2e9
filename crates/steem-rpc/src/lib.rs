//! Steem condenser-API JSON-RPC client.
//!
//! This crate provides [`SteemRpcClient`], a thin typed client for the subset
//! of the Steem condenser API the gateway serves. It deliberately stays
//! low-level: one HTTP call per method, no retries, no caching. Pooling,
//! failover and caching live in the gateway on top of this crate.
//!
//! # Crate Relationships
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Service Layer (steem-gateway)                           │
//! │  └─ upstream pool, retrying caller, cache, fan-out       │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  RPC Layer (steem-rpc) ◄── YOU ARE HERE                  │
//! │  └─ Direct condenser-API JSON-RPC access                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use steem_rpc::SteemRpcClient;
//!
//! let client = SteemRpcClient::new("https://api.steemit.com")?;
//!
//! let props = client.get_dynamic_global_properties().await?;
//! println!("head block: {}", props.head_block_number);
//! ```
//!
//! # Payload Philosophy
//!
//! Block headers, full blocks, operations and transactions are carried as
//! opaque [`serde_json::Value`]: the gateway forwards them verbatim and never
//! interprets their contents. The one typed payload is
//! [`DynamicGlobalProperties`], because head-change detection needs the block
//! height as a number; everything else in that object is preserved untouched.
//!
//! # Modules
//!
//! - [`client`] - The main [`SteemRpcClient`] implementation
//! - [`config`] - Configuration options via [`ClientConfig`]
//! - [`error`] - Error types with retryability/network classification
//! - [`types`] - JSON-RPC envelope and condenser payload types
//!
//! # Error Handling
//!
//! All operations return [`Result<T, RpcError>`](error::Result). The gateway
//! keys its failover behavior off [`RpcError::is_network`]:
//!
//! ```ignore
//! match client.get_block(height).await {
//!     Ok(block) => { /* serve */ }
//!     Err(e) if e.is_network() => {
//!         // rotate to a different endpoint
//!     }
//!     Err(e) => { /* surface to the caller */ }
//! }
//! ```

#![doc(html_root_url = "https://docs.steemgateway.io/steem-rpc")]

// ═══════════════════════════════════════════════════════════════════════════════
// MODULES
// ═══════════════════════════════════════════════════════════════════════════════

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// ═══════════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

// Primary types - what most users need
pub use client::SteemRpcClient;
pub use config::ClientConfig;
pub use error::{Result, RpcError};
pub use types::DynamicGlobalProperties;

// ═══════════════════════════════════════════════════════════════════════════════
// CRATE INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
