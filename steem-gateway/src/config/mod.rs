//! Configuration loading and validation for the Steem gateway.
//!
//! Configuration is loaded from multiple sources in order of precedence:
//! 1. Environment variables (highest)
//! 2. Environment-specific file (e.g., `development.toml`)
//! 3. Default file (`default.toml`)
//!
//! # Example
//!
//! ```ignore
//! use steem_gateway::config::Settings;
//!
//! let settings = Settings::load("development")?;
//! println!("Listening on {}", settings.server.socket_addr());
//! ```

mod settings;

pub use settings::{
    CacheSettings, LoggingSettings, PollerSettings, ServerSettings, Settings, UpstreamSettings,
};
