//! Request dispatcher: work items in, reply/error frames out.
//!
//! The front-end pushes `(session, parsed-frame)` work items onto the
//! bounded queue; the dispatcher pump hands each item to its own task, so
//! one slow upstream call never blocks the queue (replies are not
//! guaranteed to match request arrival order).
//!
//! Per frame: resolve the method against the closed set, validate
//! arguments, serve from the cache or through the retrying caller, and
//! emit exactly one reply or error frame on the originating session.
//! Replies to sessions that closed in the meantime are dropped silently.

use serde_json::{Value, json};
use tracing::{debug, warn};

use steem_rpc::RpcError;

use crate::protocol::{
    ApiMethod, ErrorFrame, Feed, RequestFrame, ResponseFrame, SubscriptionUpdateFrame,
};
use crate::server::AppState;
use crate::session::SessionHandle;

// ═══════════════════════════════════════════════════════════════════════════════
// WORK ITEMS
// ═══════════════════════════════════════════════════════════════════════════════

/// One queued request: the originating session and its parsed frame.
#[derive(Debug)]
pub struct WorkItem {
    /// Write handle of the session that sent the frame.
    pub session: SessionHandle,
    /// The parsed request.
    pub frame: RequestFrame,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Handle one request frame to completion.
pub async fn dispatch(state: &AppState, session: &SessionHandle, frame: RequestFrame) {
    let id = frame.reply_id();

    let Some(method_name) = frame.method else {
        session.send_json(&ErrorFrame::new(id, "Method is required", "unknown"));
        return;
    };

    let Some(method) = ApiMethod::resolve(&method_name) else {
        session.send_json(&ErrorFrame::new(
            id,
            format!("Unsupported method: {method_name}"),
            method_name,
        ));
        return;
    };

    let params = frame.params.unwrap_or_default();

    match method {
        ApiMethod::DynamicGlobalProperties => {
            let caller = state.caller.clone();
            let result = state
                .cache
                .head_state(|| async move { caller.dynamic_global_properties().await })
                .await
                .and_then(|props| props.to_value().map_err(RpcError::from));
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::BlockHeader => {
            let Some(height) = param_u64(&params, 0) else {
                session.send_json(&ErrorFrame::new(id, "Block number is required", method_name));
                return;
            };
            let result = fetch_block_header(state, height).await;
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::Block => {
            let Some(height) = param_u64(&params, 0) else {
                session.send_json(&ErrorFrame::new(id, "Block number is required", method_name));
                return;
            };
            let result = fetch_block(state, height).await;
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::OpsInBlock => {
            let Some(height) = param_u64(&params, 0) else {
                session.send_json(&ErrorFrame::new(id, "Block number is required", method_name));
                return;
            };
            let only_virtual = param_bool(&params, 1).unwrap_or(false);
            let result = fetch_ops(state, height, only_virtual).await;
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::ActiveWitnesses => {
            let caller = state.caller.clone();
            let result = state
                .cache
                .active_witnesses(|| async move { caller.active_witnesses().await })
                .await
                .map(|witnesses| json!(witnesses));
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::Transaction => {
            let Some(tx_id) = param_str(&params, 0) else {
                session.send_json(&ErrorFrame::new(
                    id,
                    "Transaction id is required",
                    method_name,
                ));
                return;
            };
            // Uncached pass-through: transaction lookups have no reuse.
            let result = state.caller.transaction(tx_id).await;
            reply(state, session, id, &method_name, result);
        }

        ApiMethod::Subscribe(feed) => handle_subscribe(state, session, id, feed),

        ApiMethod::Unsubscribe(feed) => {
            state.subscriptions.unsubscribe(feed, &session.id());
            session.send_json(&ResponseFrame::new(
                id,
                json!({"unsubscribed": true, "type": feed.name()}),
            ));
        }
    }
}

/// Send the reply or error frame for a completed read.
fn reply(
    state: &AppState,
    session: &SessionHandle,
    id: Value,
    method_name: &str,
    result: Result<Value, RpcError>,
) {
    match result {
        Ok(value) => {
            session.send_json(&ResponseFrame::new(id, value));
        }
        Err(err) => {
            // A network or timeout failure here means the retrying caller
            // exhausted its attempts on sick endpoints; rotate once more so
            // the next unrelated call starts on a fresh one.
            if err.is_network() {
                state.caller.rotate();
            }
            warn!(method = method_name, error = %err, "Request failed upstream");
            session.send_json(&ErrorFrame::new(id, err.to_string(), method_name));
        }
    }
}

/// Subscribe a session and deliver the immediate snapshot for slot-backed
/// feeds, before any periodic fan-out.
fn handle_subscribe(state: &AppState, session: &SessionHandle, id: Value, feed: Feed) {
    state.subscriptions.subscribe(feed, session.clone());
    session.send_json(&ResponseFrame::new(
        id,
        json!({"subscribed": true, "type": feed.name()}),
    ));

    if !feed.is_slot_backed() {
        return;
    }

    // The snapshot rides the same per-session queue as the ack above, so a
    // subscriber never observes a gap between ack and first datum.
    let snapshot = match feed {
        Feed::GlobalProperties => state
            .cache
            .peek_head()
            .and_then(|(props, _)| props.to_value().ok()),
        Feed::Witnesses => state.cache.peek_witnesses().map(|(list, _)| json!(list)),
        _ => None,
    };

    if let Some(data) = snapshot {
        debug!(feed = feed.name(), session = %session.id(), "Delivering subscribe snapshot");
        session.send_json(&SubscriptionUpdateFrame::new(feed, data));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CACHED FETCH HELPERS
// ═══════════════════════════════════════════════════════════════════════════════
// Shared with the poll driver, which fetches the same artifacts for fan-out.

/// Fetch a block header through the cache.
///
/// # Errors
///
/// Propagates the upstream error after retries are exhausted.
pub async fn fetch_block_header(state: &AppState, height: u64) -> Result<Value, RpcError> {
    if let Some(cached) = state.cache.get_block_header(height) {
        return Ok(cached);
    }
    let header = state.caller.block_header(height).await?;
    state.cache.put_block_header(height, header.clone());
    Ok(header)
}

/// Fetch a full block through the cache.
///
/// # Errors
///
/// Propagates the upstream error after retries are exhausted.
pub async fn fetch_block(state: &AppState, height: u64) -> Result<Value, RpcError> {
    if let Some(cached) = state.cache.get_block(height) {
        return Ok(cached);
    }
    let block = state.caller.block(height).await?;
    state.cache.put_block(height, block.clone());
    Ok(block)
}

/// Fetch the operations in a block through the cache.
///
/// # Errors
///
/// Propagates the upstream error after retries are exhausted.
pub async fn fetch_ops(
    state: &AppState,
    height: u64,
    only_virtual: bool,
) -> Result<Value, RpcError> {
    if let Some(cached) = state.cache.get_ops(height, only_virtual) {
        return Ok(cached);
    }
    let ops = state.caller.ops_in_block(height, only_virtual).await?;
    state.cache.put_ops(height, only_virtual, ops.clone());
    Ok(ops)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETER EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Extract a block height; accepts a JSON number or a numeric string.
fn param_u64(params: &[Value], index: usize) -> Option<u64> {
    match params.get(index)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Extract a boolean flag.
fn param_bool(params: &[Value], index: usize) -> Option<bool> {
    params.get(index)?.as_bool()
}

/// Extract a non-empty string argument.
fn param_str(params: &[Value], index: usize) -> Option<&str> {
    params.get(index)?.as_str().filter(|s| !s.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn param_u64_accepts_numbers_and_strings() {
        let params = vec![json!(42), json!("123"), json!(true), json!(-1)];

        assert_eq!(param_u64(&params, 0), Some(42));
        assert_eq!(param_u64(&params, 1), Some(123));
        assert_eq!(param_u64(&params, 2), None);
        assert_eq!(param_u64(&params, 3), None);
        assert_eq!(param_u64(&params, 9), None);
    }

    #[test]
    fn param_u64_rejects_null() {
        let params = vec![Value::Null];
        assert_eq!(param_u64(&params, 0), None);
    }

    #[test]
    fn param_bool_extraction() {
        let params = vec![json!(1), json!(true)];
        assert_eq!(param_bool(&params, 0), None);
        assert_eq!(param_bool(&params, 1), Some(true));
        assert_eq!(param_bool(&params, 2), None);
    }

    #[test]
    fn param_str_rejects_empty() {
        let params = vec![json!("abc123"), json!("")];
        assert_eq!(param_str(&params, 0), Some("abc123"));
        assert_eq!(param_str(&params, 1), None);
    }
}
