//! Steem WebSocket Gateway
//!
//! A fan-out gateway between many lightweight WebSocket clients and a small
//! pool of Steem condenser-API JSON-RPC endpoints. Clients issue
//! request/reply reads or subscribe to live feeds; the gateway keeps
//! upstream load flat by deduplicating reads through a tiered cache,
//! sharing one internal head-state poll across all clients, and rotating
//! off unhealthy endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          GATEWAY CORE                              │
//! │                                                                    │
//! │  client frame ─▶ front-end ─▶ work queue ─▶ dispatcher             │
//! │                  (cap, rate)   (bounded)        │                  │
//! │                                     ┌───────────┤                  │
//! │                                     ▼           ▼                  │
//! │                                ┌─────────┐ ┌───────────┐           │
//! │                                │  cache  │ │  retrying │──▶ pool   │
//! │                                └─────────┘ │  caller   │           │
//! │                                            └───────────┘           │
//! │  poll driver ─▶ head change ─▶ subscription registry ─▶ fan-out    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Layered error types
//! - [`protocol`] - Wire frames and the closed method set
//! - [`upstream`] - Endpoint pool, health tracking, retrying caller
//! - [`cache`] - Tiered cache with stale-on-error slots and bounded maps
//! - [`session`] - Client sessions, rate windows, connection registry
//! - [`subscriptions`] - Per-feed membership and fan-out
//! - [`dispatcher`] - Request handling
//! - [`server`] - Axum assembly, WebSocket front-end, introspection
//! - [`poller`] - Poll driver and health probe
//!
//! # Getting Started
//!
//! ```bash
//! # Optional: override the defaults
//! export GATEWAY_SERVER__PORT=8080
//! export GATEWAY_UPSTREAM__ENDPOINTS=https://api.steemit.com,https://api.hive.blog
//!
//! # Start the gateway
//! cargo run -- run
//! ```

#![doc(html_root_url = "https://docs.steemgateway.io/gateway")]

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod server;
pub mod session;
pub mod subscriptions;
pub mod upstream;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
