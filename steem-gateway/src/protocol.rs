//! Wire protocol: JSON frames and the closed method set.
//!
//! Clients exchange one JSON frame per WebSocket message. Inbound frames are
//! `{id, method, params}` requests; outbound frames are tagged by a `type`
//! field (`response`, `error`, `connection`, `subscription_update`,
//! `broadcast`).
//!
//! Method names are resolved to a closed sum ([`ApiMethod`]) at parse time.
//! Each method is accepted bare and with a `condenser_api.` or
//! `market_history_api.` prefix; both forms resolve to the same handler.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// FEEDS
// ═══════════════════════════════════════════════════════════════════════════════

/// The closed set of subscription feeds served by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Head-state updates on every new block.
    GlobalProperties,
    /// Block headers on every new block.
    BlockHeaders,
    /// Full blocks on every new block.
    Blocks,
    /// Operations on every new block.
    Operations,
    /// Active witness list, on change.
    Witnesses,
}

impl Feed {
    /// All feeds, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::GlobalProperties,
        Self::BlockHeaders,
        Self::Blocks,
        Self::Operations,
        Self::Witnesses,
    ];

    /// The feed name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GlobalProperties => "global_properties",
            Self::BlockHeaders => "block_headers",
            Self::Blocks => "blocks",
            Self::Operations => "operations",
            Self::Witnesses => "witnesses",
        }
    }

    /// Whether this feed is backed by an always-materialized cache slot.
    ///
    /// Slot-backed feeds deliver an immediate snapshot on subscribe when the
    /// slot is populated.
    #[must_use]
    pub const fn is_slot_backed(self) -> bool {
        matches!(self, Self::GlobalProperties | Self::Witnesses)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// METHOD RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Namespace prefixes accepted (and ignored) on method names.
const METHOD_PREFIXES: [&str; 2] = ["condenser_api.", "market_history_api."];

/// The closed set of methods the gateway dispatches.
///
/// Unknown names fail resolution at parse time; the dispatcher replies with
/// an `Unsupported method` error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    /// Current head state (cached in the head slot).
    DynamicGlobalProperties,
    /// Block header by height (cached per height).
    BlockHeader,
    /// Full block by height (cached per height).
    Block,
    /// Operations in a block (cached per height and only-virtual flag).
    OpsInBlock,
    /// Active witness list (cached in the witness slot).
    ActiveWitnesses,
    /// Transaction by id (uncached pass-through).
    Transaction,
    /// Join a feed.
    Subscribe(Feed),
    /// Leave a feed.
    Unsubscribe(Feed),
}

impl ApiMethod {
    /// Resolve a wire method name to its handler identifier.
    ///
    /// Returns `None` for names outside the closed set.
    #[must_use]
    pub fn resolve(name: &str) -> Option<Self> {
        let bare = METHOD_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name);

        match bare {
            "get_dynamic_global_properties" => Some(Self::DynamicGlobalProperties),
            "get_block_header" => Some(Self::BlockHeader),
            "get_block" => Some(Self::Block),
            "get_ops_in_block" => Some(Self::OpsInBlock),
            "get_active_witnesses" => Some(Self::ActiveWitnesses),
            "get_transaction" => Some(Self::Transaction),
            "subscribe_global_properties" => Some(Self::Subscribe(Feed::GlobalProperties)),
            "subscribe_block_headers" => Some(Self::Subscribe(Feed::BlockHeaders)),
            "subscribe_blocks" => Some(Self::Subscribe(Feed::Blocks)),
            "subscribe_operations" => Some(Self::Subscribe(Feed::Operations)),
            "subscribe_witnesses" => Some(Self::Subscribe(Feed::Witnesses)),
            "unsubscribe_global_properties" => Some(Self::Unsubscribe(Feed::GlobalProperties)),
            "unsubscribe_block_headers" => Some(Self::Unsubscribe(Feed::BlockHeaders)),
            "unsubscribe_blocks" => Some(Self::Unsubscribe(Feed::Blocks)),
            "unsubscribe_operations" => Some(Self::Unsubscribe(Feed::Operations)),
            "unsubscribe_witnesses" => Some(Self::Unsubscribe(Feed::Witnesses)),
            _ => None,
        }
    }

    /// Bare names of the request/reply read methods, for the hello frame.
    #[must_use]
    pub const fn available_apis() -> [&'static str; 6] {
        [
            "get_dynamic_global_properties",
            "get_block_header",
            "get_block",
            "get_ops_in_block",
            "get_active_witnesses",
            "get_transaction",
        ]
    }

    /// Names of the subscription control methods, for the hello frame.
    #[must_use]
    pub const fn subscription_apis() -> [&'static str; 10] {
        [
            "subscribe_global_properties",
            "subscribe_block_headers",
            "subscribe_blocks",
            "subscribe_operations",
            "subscribe_witnesses",
            "unsubscribe_global_properties",
            "unsubscribe_block_headers",
            "unsubscribe_blocks",
            "unsubscribe_operations",
            "unsubscribe_witnesses",
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INBOUND FRAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// A client request frame: `{id, method, params}`.
///
/// Every field is optional at the parse level so a malformed request can
/// still be answered with an error frame echoing whatever id it carried.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFrame {
    /// Client-supplied correlation id, echoed on the reply.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name (bare or namespace-prefixed).
    #[serde(default)]
    pub method: Option<String>,
    /// Positional arguments.
    #[serde(default)]
    pub params: Option<Vec<Value>>,
}

impl RequestFrame {
    /// The id to echo on replies: the client's id, or `"unknown"`.
    #[must_use]
    pub fn reply_id(&self) -> Value {
        self.id.clone().unwrap_or_else(|| Value::from("unknown"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTBOUND FRAMES
// ═══════════════════════════════════════════════════════════════════════════════

/// A successful reply: `{id, type: "response", result}`.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFrame {
    /// Echoed client id.
    pub id: Value,
    /// Frame tag, always `"response"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Method result.
    pub result: Value,
}

impl ResponseFrame {
    /// Build a reply frame.
    #[must_use]
    pub const fn new(id: Value, result: Value) -> Self {
        Self {
            id,
            frame_type: "response",
            result,
        }
    }
}

/// An error reply: `{id, type: "error", error, method}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    /// Echoed client id, or `"unknown"`.
    pub id: Value,
    /// Frame tag, always `"error"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Human-readable error description.
    pub error: String,
    /// The method name the error relates to.
    pub method: String,
    /// Epoch milliseconds at which the rate-limit window resets.
    /// Present only on rate-limit errors.
    #[serde(rename = "rateLimitReset", skip_serializing_if = "Option::is_none")]
    pub rate_limit_reset: Option<i64>,
}

impl ErrorFrame {
    /// Build an error frame.
    #[must_use]
    pub fn new(id: Value, error: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            id,
            frame_type: "error",
            error: error.into(),
            method: method.into(),
            rate_limit_reset: None,
        }
    }

    /// Build a rate-limit error frame naming the window reset instant.
    #[must_use]
    pub fn rate_limited(id: Value, method: impl Into<String>, reset_at_ms: i64) -> Self {
        Self {
            id,
            frame_type: "error",
            error: "Rate limit exceeded".into(),
            method: method.into(),
            rate_limit_reset: Some(reset_at_ms),
        }
    }
}

/// The hello frame sent once on accept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloFrame {
    /// Frame tag, always `"connection"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Connection status, always `"connected"`.
    pub status: &'static str,
    /// Human-readable greeting.
    pub message: String,
    /// Bare names of the request/reply methods.
    pub available_apis: Vec<&'static str>,
    /// Names of the subscription control methods.
    pub subscription_apis: Vec<&'static str>,
    /// Rate limits applied to this connection.
    pub rate_limits: RateLimits,
}

impl HelloFrame {
    /// Build the hello frame for the configured per-minute cap.
    #[must_use]
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            frame_type: "connection",
            status: "connected",
            message: "Connected to Steem WebSocket gateway".into(),
            available_apis: ApiMethod::available_apis().to_vec(),
            subscription_apis: ApiMethod::subscription_apis().to_vec(),
            rate_limits: RateLimits {
                requests_per_minute,
                subscriptions_unlimited: true,
            },
        }
    }
}

/// Rate limits advertised in the hello frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    /// Frames accepted per sliding 60-second window.
    pub requests_per_minute: u32,
    /// Subscription delivery is not counted against the request cap.
    pub subscriptions_unlimited: bool,
}

/// A subscription delivery frame.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionUpdateFrame {
    /// Frame tag, always `"subscription_update"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Feed name the payload belongs to.
    pub subscription: &'static str,
    /// Feed payload.
    pub data: Value,
    /// Epoch milliseconds at emission.
    pub timestamp: i64,
}

impl SubscriptionUpdateFrame {
    /// Build a delivery frame for a feed, stamped now.
    #[must_use]
    pub fn new(feed: Feed, data: Value) -> Self {
        Self {
            frame_type: "subscription_update",
            subscription: feed.name(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// The legacy broadcast frame, kept for wire compatibility.
///
/// Delivered only to sessions NOT subscribed to the `global_properties`
/// feed; subscribers receive [`SubscriptionUpdateFrame`] instead, so a
/// session sees exactly one frame per head change.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastFrame {
    /// Frame tag, always `"broadcast"`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Legacy event name.
    pub method: &'static str,
    /// Head-state payload.
    pub data: Value,
    /// Epoch milliseconds at emission.
    pub timestamp: i64,
}

impl BroadcastFrame {
    /// Build the legacy head-state broadcast, stamped now.
    #[must_use]
    pub fn global_properties_update(data: Value) -> Self {
        Self {
            frame_type: "broadcast",
            method: "dynamic_global_properties_update",
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
