//! Client sessions: handles, rate windows, and the open-connection registry.
//!
//! One session exists per accepted WebSocket connection. A
//! [`SessionHandle`] is the write side: a cheap clone holding the session id
//! and a bounded outbound queue drained by the connection's writer task.
//! Everything that needs to reach a client (dispatcher replies,
//! subscription fan-out, the legacy broadcast) goes through a handle.
//!
//! The [`SessionRegistry`] tracks open connections against the configured
//! cap. Slot accounting is a compare-and-swap counter, so the open count
//! never exceeds the cap even under concurrent accepts.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Bound on each session's outbound frame queue.
///
/// A queue this deep only fills when a client stops reading; fan-out then
/// drops frames for that session instead of stalling every other client.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a non-blocking frame send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued for delivery.
    Sent,
    /// Queue full; the frame was dropped for this session.
    Dropped,
    /// The session's writer is gone; the session is dead.
    Closed,
}

/// Write handle for one client session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    outbound: mpsc::Sender<String>,
}

impl SessionHandle {
    /// Create a handle over an outbound queue.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
        }
    }

    /// The session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session's writer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queue a pre-serialized frame.
    pub fn send_text(&self, frame: String) -> SendOutcome {
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(session = %self.id, "Outbound queue full, dropping frame");
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Serialize and queue a frame.
    ///
    /// Serialization failures are swallowed: every outbound frame type in
    /// this crate serializes infallibly, and a reply that cannot be encoded
    /// has nowhere else to go.
    pub fn send_json<T: Serialize>(&self, frame: &T) -> SendOutcome {
        match serde_json::to_string(frame) {
            Ok(text) => self.send_text(text),
            Err(_) => SendOutcome::Dropped,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE WINDOW
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of the rate-limit window in milliseconds.
const RATE_WINDOW_MS: i64 = 60_000;

/// Decision from a rate-window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The frame is within the cap.
    Allowed,
    /// The frame exceeds the cap; the window resets at the given instant
    /// (epoch milliseconds).
    Limited {
        /// Epoch milliseconds at which the window resets.
        reset_at_ms: i64,
    },
}

/// Per-session sliding 60-second frame counter.
///
/// Owned by the connection's reader task; no locking needed.
#[derive(Debug)]
pub struct RateWindow {
    cap: u32,
    window_start_ms: i64,
    count: u32,
}

impl RateWindow {
    /// Create a window with the given per-minute cap.
    #[must_use]
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            window_start_ms: Utc::now().timestamp_millis(),
            count: 0,
        }
    }

    /// Count one frame against the window.
    pub fn check(&mut self) -> RateDecision {
        self.check_at(Utc::now().timestamp_millis())
    }

    /// Count one frame at an explicit instant (testable core).
    fn check_at(&mut self, now_ms: i64) -> RateDecision {
        if now_ms - self.window_start_ms >= RATE_WINDOW_MS {
            self.window_start_ms = now_ms;
            self.count = 1;
            return RateDecision::Allowed;
        }

        if self.count < self.cap {
            self.count += 1;
            return RateDecision::Allowed;
        }

        RateDecision::Limited {
            reset_at_ms: self.window_start_ms + RATE_WINDOW_MS,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Registry of open sessions, bounded by the connection cap.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    open: AtomicUsize,
    cap: usize,
}

impl SessionRegistry {
    /// Create a registry with the given connection cap.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            open: AtomicUsize::new(0),
            cap,
        }
    }

    /// The configured connection cap.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Current open-connection count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.load(Ordering::Relaxed)
    }

    /// Whether no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a connection slot. Returns `false` at the cap.
    pub fn try_acquire_slot(&self) -> bool {
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.cap).then_some(n + 1)
            })
            .is_ok()
    }

    /// Register a session in a previously reserved slot.
    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id(), handle);
    }

    /// Remove a session and free its slot.
    pub fn remove(&self, id: &Uuid) {
        if self.sessions.remove(id).is_some() {
            self.open.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Release a reserved slot that never registered a session.
    pub fn release_slot(&self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }

    /// Send a pre-serialized frame to every open session except the given
    /// set. Used by the legacy broadcast path, which excludes feed
    /// subscribers.
    pub fn broadcast_except(&self, excluded: &std::collections::HashSet<Uuid>, frame: &str) -> usize {
        let mut delivered = 0;
        for entry in &self.sessions {
            if excluded.contains(entry.key()) {
                continue;
            }
            if entry.value().send_text(frame.to_string()) == SendOutcome::Sent {
                delivered += 1;
            }
        }
        delivered
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
