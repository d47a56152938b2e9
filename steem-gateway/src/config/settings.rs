//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// WebSocket/HTTP server configuration.
    pub server: ServerSettings,
    /// Upstream endpoint pool configuration.
    pub upstream: UpstreamSettings,
    /// Cache TTL and sizing configuration.
    pub cache: CacheSettings,
    /// Poll driver and health probe configuration.
    pub poller: PollerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `GATEWAY_` prefix
    ///
    /// List-valued keys (`upstream.endpoints`, `server.cors_origins`) accept
    /// comma-separated values from the environment, e.g.
    /// `GATEWAY_UPSTREAM__ENDPOINTS=https://a.example,https://b.example`.
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.cors_origins", vec!["*"])?
            .set_default("server.max_connections", 100)?
            .set_default("server.requests_per_minute", 2000)?
            .set_default("server.queue_capacity", 1000)?
            .set_default(
                "upstream.endpoints",
                vec![
                    "https://api.steemit.com",
                    "https://api.hive.blog",
                    "https://anyx.io",
                ],
            )?
            .set_default("upstream.request_timeout_ms", 10_000)?
            .set_default("upstream.max_retries", 3)?
            .set_default("upstream.retry_base_delay_ms", 1000)?
            .set_default("upstream.recovery_window_secs", 60)?
            .set_default("cache.head_ttl_ms", 3000)?
            .set_default("cache.witness_ttl_ms", 300_000)?
            .set_default("cache.block_ttl_ms", 300_000)?
            .set_default("cache.max_entries_per_map", 1000)?
            .set_default("poller.poll_interval_ms", 3000)?
            .set_default("poller.health_probe_interval_ms", 30_000)?
            .set_default("poller.slow_response_threshold_ms", 2000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (GATEWAY_ prefix)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("upstream.endpoints")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Server validation
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".into());
        }
        if self.server.max_connections == 0 {
            errors.push("server.max_connections must be non-zero".into());
        }
        if self.server.requests_per_minute == 0 {
            errors.push("server.requests_per_minute must be non-zero".into());
        }
        if self.server.queue_capacity == 0 {
            errors.push("server.queue_capacity must be non-zero".into());
        }

        // Upstream validation
        if self.upstream.endpoints.is_empty() {
            errors.push("upstream.endpoints cannot be empty".into());
        }
        if self.upstream.endpoints.iter().any(String::is_empty) {
            errors.push("upstream.endpoints cannot contain empty URLs".into());
        }
        if self.upstream.max_retries == 0 {
            errors.push("upstream.max_retries must be non-zero".into());
        }

        // Cache validation
        if self.cache.max_entries_per_map == 0 {
            errors.push("cache.max_entries_per_map must be non-zero".into());
        }

        // Poller validation
        if self.poller.poll_interval_ms == 0 {
            errors.push("poller.poll_interval_ms must be non-zero".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// WebSocket/HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allowed CORS origins. `["*"]` permits any origin.
    pub cors_origins: Vec<String>,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Per-connection frame cap within a sliding 60-second window.
    pub requests_per_minute: u32,
    /// Bound on the request work queue.
    pub queue_capacity: usize,
}

impl ServerSettings {
    /// Get the socket address string.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream endpoint pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSettings {
    /// Ordered list of condenser-API endpoint URLs.
    pub endpoints: Vec<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Attempts per logical call (first try included).
    pub max_retries: u32,
    /// Base delay between retry attempts in milliseconds; the n-th retry
    /// waits `n * base`.
    pub retry_base_delay_ms: u64,
    /// How long an endpoint's last error disqualifies it from failover
    /// selection, in seconds.
    pub recovery_window_secs: u64,
}

impl UpstreamSettings {
    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get the retry base delay as a `Duration`.
    #[must_use]
    pub const fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Get the recovery window as a `Duration`.
    #[must_use]
    pub const fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }
}

/// Cache TTL and sizing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// TTL for the head-state slot in milliseconds.
    pub head_ttl_ms: u64,
    /// TTL for the witness-list slot in milliseconds.
    ///
    /// Anything from 60 s to 5 min is reasonable; the default is 5 min.
    pub witness_ttl_ms: u64,
    /// TTL for per-block artifacts (headers, blocks, operations) in
    /// milliseconds.
    pub block_ttl_ms: u64,
    /// Maximum entries per bounded block-artifact map.
    pub max_entries_per_map: usize,
}

impl CacheSettings {
    /// Get the head-state TTL as a `Duration`.
    #[must_use]
    pub const fn head_ttl(&self) -> Duration {
        Duration::from_millis(self.head_ttl_ms)
    }

    /// Get the witness-list TTL as a `Duration`.
    #[must_use]
    pub const fn witness_ttl(&self) -> Duration {
        Duration::from_millis(self.witness_ttl_ms)
    }

    /// Get the block-artifact TTL as a `Duration`.
    #[must_use]
    pub const fn block_ttl(&self) -> Duration {
        Duration::from_millis(self.block_ttl_ms)
    }
}

/// Poll driver and health probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    /// Head-state poll period in milliseconds.
    pub poll_interval_ms: u64,
    /// Health probe period in milliseconds.
    pub health_probe_interval_ms: u64,
    /// Responses slower than this (milliseconds) are logged as slow but do
    /// not by themselves trigger failover.
    pub slow_response_threshold_ms: u64,
}

impl PollerSettings {
    /// Get the poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the health probe interval as a `Duration`.
    #[must_use]
    pub const fn health_probe_interval(&self) -> Duration {
        Duration::from_millis(self.health_probe_interval_ms)
    }

    /// Get the slow-response threshold as a `Duration`.
    #[must_use]
    pub const fn slow_response_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_response_threshold_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format (json, pretty).
    pub format: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn create_valid_settings() -> Settings {
        Settings {
            server: ServerSettings {
                host: "0.0.0.0".into(),
                port: 8080,
                cors_origins: vec!["*".into()],
                max_connections: 100,
                requests_per_minute: 2000,
                queue_capacity: 1000,
            },
            upstream: UpstreamSettings {
                endpoints: vec!["https://api.steemit.com".into()],
                request_timeout_ms: 10_000,
                max_retries: 3,
                retry_base_delay_ms: 1000,
                recovery_window_secs: 60,
            },
            cache: CacheSettings {
                head_ttl_ms: 3000,
                witness_ttl_ms: 300_000,
                block_ttl_ms: 300_000,
                max_entries_per_map: 1000,
            },
            poller: PollerSettings {
                poll_interval_ms: 3000,
                health_probe_interval_ms: 30_000,
                slow_response_threshold_ms: 2000,
            },
            logging: LoggingSettings {
                level: "info".into(),
                format: "pretty".into(),
            },
        }
    }

    #[test]
    fn upstream_durations() {
        let settings = create_valid_settings();
        assert_eq!(
            settings.upstream.request_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(settings.upstream.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(settings.upstream.recovery_window(), Duration::from_secs(60));
    }

    #[test]
    fn server_socket_addr() {
        let mut settings = create_valid_settings();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 9000;
        assert_eq!(settings.server.socket_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn valid_settings_pass_validation() {
        assert!(create_valid_settings().validate().is_ok());
    }

    #[test]
    fn validation_catches_empty_endpoints() {
        let mut settings = create_valid_settings();
        settings.upstream.endpoints.clear();

        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("upstream.endpoints")));
    }

    #[test]
    fn validation_catches_zero_connections() {
        let mut settings = create_valid_settings();
        settings.server.max_connections = 0;

        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max_connections")));
    }

    #[test]
    fn validation_catches_zero_queue() {
        let mut settings = create_valid_settings();
        settings.server.queue_capacity = 0;

        let errors = settings.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("queue_capacity")));
    }

    #[test]
    fn validation_collects_multiple_errors() {
        let mut settings = create_valid_settings();
        settings.server.port = 0;
        settings.cache.max_entries_per_map = 0;

        let errors = settings.validate().unwrap_err();
        assert!(errors.len() >= 2);
    }
}
