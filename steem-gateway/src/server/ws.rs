//! WebSocket front-end: accept, admission, read/write loops.
//!
//! Each accepted connection gets a session (uuid id, bounded outbound
//! queue) and two tasks:
//!
//! - the **writer** drains the outbound queue into the socket sink;
//! - the **reader** parses inbound frames and applies admission in order:
//!   JSON parse, per-session rate window, bounded work queue. Over-limit
//!   and overflow frames are answered with error frames and never reach
//!   the dispatcher.
//!
//! On close (either direction), the session is removed from the session
//! registry and from every subscription feed.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatcher::WorkItem;
use crate::protocol::{ErrorFrame, HelloFrame, RequestFrame};
use crate::session::{
    OUTBOUND_QUEUE_CAPACITY, RateDecision, RateWindow, SessionHandle,
};

use super::{AppState, http};

/// `GET /`: WebSocket upgrade, or the service document for plain HTTP.
pub async fn websocket_or_document(
    State(state): State<Arc<AppState>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(upgrade) => upgrade
            .on_upgrade(move |socket| handle_socket(state, socket))
            .into_response(),
        None => http::service_document(State(state)).await.into_response(),
    }
}

/// Run one connection to completion.
async fn handle_socket(state: Arc<AppState>, mut socket: WebSocket) {
    // Admission: connection cap. The slot is reserved before the session
    // exists, so the open count can never exceed the cap.
    if !state.sessions.try_acquire_slot() {
        warn!(
            open = state.sessions.len(),
            cap = state.sessions.cap(),
            "Connection rejected: at capacity"
        );
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: "Server at connection capacity".into(),
            })))
            .await;
        return;
    }

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let handle = SessionHandle::new(outbound_tx);
    let session_id = handle.id();
    state.sessions.insert(handle.clone());
    info!(session = %session_id, open = state.sessions.len(), "Client connected");

    handle.send_json(&HelloFrame::new(state.settings.server.requests_per_minute));

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(sink, outbound_rx));

    read_loop(&state, &handle, stream).await;

    // Teardown: purge the session everywhere, then let the writer drain.
    state.sessions.remove(&session_id);
    state.subscriptions.remove_session(&session_id);
    drop(handle);
    let _ = writer.await;

    info!(session = %session_id, open = state.sessions.len(), "Client disconnected");
}

/// Drain the outbound queue into the socket.
///
/// Ends when every sender is gone (session teardown) or the socket errors.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    while let Some(text) = outbound_rx.recv().await {
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

/// Parse inbound frames and push them through admission.
async fn read_loop(
    state: &Arc<AppState>,
    handle: &SessionHandle,
    mut stream: SplitStream<WebSocket>,
) {
    let mut rate = RateWindow::new(state.settings.server.requests_per_minute);

    while let Some(message) = stream.next().await {
        let Ok(message) = message else { break };

        match message {
            Message::Text(text) => handle_frame(state, handle, &mut rate, &text),
            Message::Close(_) => break,
            // Pings are answered at the protocol layer; binary is ignored.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

/// Admit one inbound text frame: parse, rate-check, enqueue.
fn handle_frame(state: &Arc<AppState>, handle: &SessionHandle, rate: &mut RateWindow, text: &str) {
    let Ok(frame) = serde_json::from_str::<RequestFrame>(text) else {
        handle.send_json(&ErrorFrame::new(
            Value::from("unknown"),
            "Invalid message format",
            "unknown",
        ));
        return;
    };

    let method = frame.method.clone().unwrap_or_else(|| "unknown".into());

    if let RateDecision::Limited { reset_at_ms } = rate.check() {
        debug!(session = %handle.id(), method, "Rate limited");
        handle.send_json(&ErrorFrame::rate_limited(
            frame.reply_id(),
            method,
            reset_at_ms,
        ));
        return;
    }

    let item = WorkItem {
        session: handle.clone(),
        frame,
    };
    if let Err(mpsc::error::TrySendError::Full(item)) = state.work_tx.try_send(item) {
        debug!(session = %handle.id(), method, "Work queue full");
        handle.send_json(&ErrorFrame::new(
            item.frame.reply_id(),
            "Server busy - request queue full",
            method,
        ));
    }
}
