//! Configuration for the Steem RPC client.
//!
//! This module provides [`ClientConfig`] for customizing client behavior:
//!
//! - Request timeouts
//! - User-agent string
//!
//! # Example
//!
//! ```
//! use steem_rpc::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::default()
//!     .with_timeout(Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::error::{Result, RpcError};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default timeout for HTTP requests to the RPC endpoint.
///
/// Upstream calls are treated as potentially long; the gateway's retry and
/// failover path engages when this elapses.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user-agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("steem-rpc/", env!("CARGO_PKG_VERSION"));

/// Minimum allowed timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum allowed timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

// ═══════════════════════════════════════════════════════════════════════════════
// CLIENT CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration options for [`SteemRpcClient`](crate::SteemRpcClient).
///
/// Use the builder pattern to customize settings:
///
/// ```
/// use steem_rpc::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_secs(5))
///     .with_user_agent("steem-gateway/1.0");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout for HTTP calls.
    ///
    /// Default: 10 seconds.
    /// Range: 100 ms - 300 seconds.
    pub timeout: Duration,

    /// User-agent header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Request timeout duration (100 ms - 300 seconds)
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user-agent header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validate the configuration.
    ///
    /// Called automatically when creating a client.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] if the timeout is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.timeout < MIN_TIMEOUT {
            return Err(RpcError::InvalidConfig(format!(
                "timeout must be at least {MIN_TIMEOUT:?}"
            )));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(RpcError::InvalidConfig(format!(
                "timeout must be at most {MAX_TIMEOUT:?}"
            )));
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, DEFAULT_REQUEST_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = ClientConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test-agent");

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "test-agent");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_timeout_too_low() {
        let config = ClientConfig::new().with_timeout(Duration::from_millis(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_timeout_too_high() {
        let config = ClientConfig::new().with_timeout(Duration::from_secs(600));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_edge_cases() {
        assert!(ClientConfig::new().with_timeout(MIN_TIMEOUT).validate().is_ok());
        assert!(ClientConfig::new().with_timeout(MAX_TIMEOUT).validate().is_ok());
    }
}
