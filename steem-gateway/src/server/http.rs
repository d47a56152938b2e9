//! HTTP introspection endpoints.
//!
//! - `GET /health` - liveness check
//! - `GET /status` - operational snapshot (connections, subscriptions,
//!   queue depth, upstream health, cache freshness)
//! - any other path - a descriptive service document, 200

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use super::{AppState, SERVICE_NAME, service_version};

/// `GET /health`: liveness only, no upstream calls.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// `GET /status`: full operational snapshot.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = state.started_at.elapsed();
    let uptime_ms = uptime.as_millis() as u64;

    let (endpoint_index, endpoint_url) = state.pool.current_endpoint();
    let cache_stats = state.cache.stats();

    let subscriptions: serde_json::Map<String, Value> = state
        .subscriptions
        .counts()
        .into_iter()
        .map(|(feed, count)| (feed.to_string(), json!(count)))
        .collect();

    Json(json!({
        "service": SERVICE_NAME,
        "version": service_version(),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": {
            "ms": uptime_ms,
            "seconds": uptime.as_secs(),
            "minutes": uptime.as_secs() / 60,
            "hours": uptime.as_secs() / 3600,
        },
        "connections": {
            "current": state.sessions.len(),
            "max": state.sessions.cap(),
        },
        "subscriptions": subscriptions,
        "queue": {
            "length": state.queue_len(),
            "capacity": state.settings.server.queue_capacity,
        },
        "upstream": {
            "currentEndpoint": endpoint_url,
            "currentIndex": endpoint_index,
            "endpoints": state.pool.health_snapshot(),
        },
        "cache": {
            "hits": cache_stats.hits,
            "misses": cache_stats.misses,
            "degradedHits": cache_stats.degraded_hits,
            "apiCallsSaved": cache_stats.calls_saved(),
            "headerEntries": cache_stats.header_entries,
            "blockEntries": cache_stats.block_entries,
            "opsEntries": cache_stats.ops_entries,
            "headAgeMs": state.cache.peek_head().map(|(_, age)| age.as_millis() as u64),
            "witnessAgeMs": state.cache.peek_witnesses().map(|(_, age)| age.as_millis() as u64),
        },
    }))
}

/// Fallback for every other path: a descriptive service document, 200.
pub async fn service_document(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": service_version(),
        "description": "WebSocket fan-out gateway for Steem condenser-API endpoints",
        "websocket": "connect to / with a WebSocket upgrade",
        "endpoints": {
            "/health": "liveness check",
            "/status": "operational snapshot",
        },
        "rateLimits": {
            "requestsPerMinute": state.settings.server.requests_per_minute,
        },
    }))
}
