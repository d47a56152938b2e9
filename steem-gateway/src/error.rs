//! Layered error types for the Steem gateway.
//!
//! - [`GatewayError`] - Application-level errors used throughout the service
//! - Client-facing errors are not Rust errors at all: protocol violations
//!   become error *frames* on the originating session (see
//!   [`crate::protocol::ErrorFrame`]) and never tear down the connection
//!
//! # Error Philosophy
//!
//! - Upstream failures are retried and rotated inside the retrying caller;
//!   what escapes it is surfaced to the one client frame that caused it
//! - Infrastructure errors are logged but their details are kept out of
//!   client frames
//! - Fatal conditions are limited to listener bind failure; everything else
//!   is recoverable

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors for the gateway service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Upstream RPC error (after retries were exhausted).
    #[error(transparent)]
    Rpc(#[from] steem_rpc::RpcError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Initialization error (listener bind, client construction).
    #[error("initialization error: {0}")]
    Initialization(String),
}

/// Type alias for gateway Results.
pub type Result<T> = std::result::Result<T, GatewayError>;

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
