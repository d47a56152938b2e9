//! Error types for the Steem RPC client.
//!
//! This module provides the error hierarchy for condenser-API operations:
//!
//! - [`RpcError`] - The primary error type for all client operations
//! - [`RpcErrorDetail`] - The server-side error object from a JSON-RPC response
//!
//! # Error Philosophy
//!
//! These errors are designed to be:
//! - **Actionable**: Each variant tells you what went wrong
//! - **Classifiable**: [`RpcError::is_network`] drives the gateway's failover
//!   path, [`RpcError::is_retryable`] drives its retry loop
//! - **Informative**: Contains enough context for debugging without leaking
//!   endpoint credentials

use std::fmt;

use thiserror::Error;

/// Result type alias using [`RpcError`].
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur when calling a condenser-API endpoint.
///
/// # Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | Network | `Connection`, `Timeout`, `Http` | Endpoint unreachable, overloaded |
/// | Protocol | `Rpc` | Server rejected the request |
/// | Data | `Serialization`, `InvalidResponse` | Malformed payload |
/// | Usage | `InvalidConfig` | Programmer error |
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// Failed to establish connection to the RPC endpoint.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Request timed out waiting for a response.
    ///
    /// The timeout duration is determined by
    /// [`ClientConfig::timeout`](crate::ClientConfig::timeout).
    #[error("request timed out")]
    Timeout,

    /// HTTP-level error (non-2xx status code, TLS issues, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error returned by the server.
    #[error("RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code (e.g., -32601 for method not found).
        code: i64,
        /// Human-readable error message from the server.
        message: String,
        /// Optional additional data from the error response.
        data: Option<String>,
    },

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response was valid JSON but had unexpected structure.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration provided to the client.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// Create an RPC error from code and message.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Check if this error is a network or timeout failure.
    ///
    /// The gateway forces an upstream failover on these, so a run of
    /// failures converges onto a healthier endpoint.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout | Self::Http(_))
    }

    /// Check if this error is likely transient and retryable.
    ///
    /// Returns `true` for network issues, timeouts, and server-side errors
    /// that might succeed on a different endpoint.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::Http(_) => true,
            Self::Rpc { code, .. } => {
                // Server overloaded or generic server error
                *code == -32005 || *code == -32000
            }
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVERSIONS FROM reqwest ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Self::Http(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC ERROR DETAILS
// ═══════════════════════════════════════════════════════════════════════════════

/// Detailed information from a JSON-RPC error response.
///
/// Used internally for parsing error responses from the server.
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct RpcErrorDetail {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RpcErrorDetail {
    /// Convert this detail into an [`RpcError`].
    pub fn into_error(self) -> RpcError {
        RpcError::Rpc {
            code: self.code,
            message: self.message,
            data: self.data.map(|v| v.to_string()),
        }
    }
}

impl fmt::Display for RpcErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error ({}): {}", self.code, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_network() {
        assert!(RpcError::Timeout.is_network());
        assert!(RpcError::Connection("refused".into()).is_network());
        assert!(RpcError::Http("503".into()).is_network());

        assert!(!RpcError::rpc(-32601, "Method not found").is_network());
        assert!(!RpcError::InvalidResponse("missing field".into()).is_network());
    }

    #[test]
    fn error_is_retryable() {
        assert!(RpcError::Timeout.is_retryable());
        assert!(RpcError::Connection("connection refused".into()).is_retryable());
        assert!(RpcError::rpc(-32000, "Server error").is_retryable());

        assert!(!RpcError::rpc(-32601, "Method not found").is_retryable());
        assert!(!RpcError::InvalidResponse("missing field".into()).is_retryable());
    }

    #[test]
    fn rpc_error_detail_deserialization() {
        let json = r#"{"code": -32601, "message": "Method not found"}"#;
        let detail: RpcErrorDetail = serde_json::from_str(json).expect("parse failed");
        assert_eq!(detail.code, -32601);
        assert_eq!(detail.message, "Method not found");
        assert!(detail.data.is_none());
    }

    #[test]
    fn rpc_error_detail_with_data() {
        let json = r#"{"code": -32000, "message": "Server error", "data": {"reason": "overloaded"}}"#;
        let detail: RpcErrorDetail = serde_json::from_str(json).expect("parse failed");
        assert_eq!(detail.code, -32000);
        assert!(detail.data.is_some());
    }

    #[test]
    fn rpc_error_detail_into_error() {
        let detail = RpcErrorDetail {
            code: -32003,
            message: "Unable to acquire database lock".into(),
            data: None,
        };
        let error = detail.into_error();
        assert!(matches!(error, RpcError::Rpc { code: -32003, .. }));
    }
}
