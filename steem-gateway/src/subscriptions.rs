//! Subscription registry: per-feed membership and fan-out.
//!
//! Each feed owns an independent membership set under its own lock, so
//! subscribing to one feed never contends with broadcasting on another.
//!
//! Membership changes happen on three paths only:
//! - explicit `subscribe_*` / `unsubscribe_*` requests,
//! - session close (the front-end purges the session from every feed),
//! - broadcast pruning: a member whose outbound channel has closed is
//!   removed while fanning out.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::Feed;
use crate::session::{SendOutcome, SessionHandle};

// ═══════════════════════════════════════════════════════════════════════════════
// SUBSCRIPTION REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-feed membership sets of session write handles.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    /// One membership map per feed, indexed by the feed's position in
    /// [`Feed::ALL`].
    feeds: [Mutex<HashMap<Uuid, SessionHandle>>; Feed::ALL.len()],
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feeds: std::array::from_fn(|_| Mutex::new(HashMap::new())),
        }
    }

    fn members(&self, feed: Feed) -> &Mutex<HashMap<Uuid, SessionHandle>> {
        &self.feeds[feed as usize]
    }

    /// Add a session to a feed. Idempotent.
    pub fn subscribe(&self, feed: Feed, handle: SessionHandle) {
        let id = handle.id();
        self.members(feed).lock().insert(id, handle);
        debug!(feed = feed.name(), session = %id, "Subscribed");
    }

    /// Remove a session from a feed. Tolerates absence.
    pub fn unsubscribe(&self, feed: Feed, id: &Uuid) {
        self.members(feed).lock().remove(id);
        debug!(feed = feed.name(), session = %id, "Unsubscribed");
    }

    /// Whether a session is subscribed to a feed.
    #[must_use]
    pub fn is_subscribed(&self, feed: Feed, id: &Uuid) -> bool {
        self.members(feed).lock().contains_key(id)
    }

    /// Remove a session from every feed. Called on session close.
    pub fn remove_session(&self, id: &Uuid) {
        for feed in Feed::ALL {
            self.members(feed).lock().remove(id);
        }
    }

    /// Number of sessions subscribed to a feed.
    #[must_use]
    pub fn subscriber_count(&self, feed: Feed) -> usize {
        self.members(feed).lock().len()
    }

    /// Subscriber counts per feed, in [`Feed::ALL`] order.
    #[must_use]
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        Feed::ALL
            .iter()
            .map(|&feed| (feed.name(), self.subscriber_count(feed)))
            .collect()
    }

    /// Ids of the sessions subscribed to a feed.
    ///
    /// The legacy broadcast path uses this to exclude subscribers, so no
    /// session receives both frames for one head change.
    #[must_use]
    pub fn subscriber_ids(&self, feed: Feed) -> HashSet<Uuid> {
        self.members(feed).lock().keys().copied().collect()
    }

    /// Send a pre-serialized frame to every member of a feed.
    ///
    /// Members whose outbound channel has closed are pruned. A member with
    /// a full queue keeps its membership but misses this frame; skips are
    /// acceptable, silent removal of live members is not.
    ///
    /// Returns the number of sessions the frame was queued for.
    pub fn broadcast(&self, feed: Feed, frame: &str) -> usize {
        let mut members = self.members(feed).lock();

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();

        for (id, handle) in members.iter() {
            match handle.send_text(frame.to_string()) {
                SendOutcome::Sent => delivered += 1,
                SendOutcome::Dropped => {}
                SendOutcome::Closed => dead.push(*id),
            }
        }

        for id in &dead {
            members.remove(id);
        }
        if !dead.is_empty() {
            debug!(
                feed = feed.name(),
                pruned = dead.len(),
                "Pruned dead subscribers during broadcast"
            );
        }

        delivered
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn test_handle() -> (SessionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        (SessionHandle::new(tx), rx)
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = test_handle();

        registry.subscribe(Feed::Blocks, handle.clone());
        registry.subscribe(Feed::Blocks, handle.clone());

        assert_eq!(registry.subscriber_count(Feed::Blocks), 1);
        assert!(registry.is_subscribed(Feed::Blocks, &handle.id()));
    }

    #[test]
    fn unsubscribe_tolerates_absence() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = test_handle();

        registry.unsubscribe(Feed::Blocks, &handle.id());
        assert_eq!(registry.subscriber_count(Feed::Blocks), 0);
    }

    #[test]
    fn feeds_are_independent() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = test_handle();

        registry.subscribe(Feed::Blocks, handle.clone());

        assert_eq!(registry.subscriber_count(Feed::Blocks), 1);
        assert_eq!(registry.subscriber_count(Feed::Operations), 0);
        assert!(!registry.is_subscribed(Feed::Operations, &handle.id()));
    }

    #[test]
    fn remove_session_purges_every_feed() {
        let registry = SubscriptionRegistry::new();
        let (handle, _rx) = test_handle();

        for feed in Feed::ALL {
            registry.subscribe(feed, handle.clone());
        }
        registry.remove_session(&handle.id());

        for feed in Feed::ALL {
            assert_eq!(registry.subscriber_count(feed), 0);
        }
    }

    #[test]
    fn broadcast_delivers_to_members() {
        let registry = SubscriptionRegistry::new();
        let (first, mut first_rx) = test_handle();
        let (second, mut second_rx) = test_handle();
        let (outsider, mut outsider_rx) = test_handle();

        registry.subscribe(Feed::Witnesses, first);
        registry.subscribe(Feed::Witnesses, second);
        registry.subscribe(Feed::Blocks, outsider);

        let delivered = registry.broadcast(Feed::Witnesses, r#"{"x":1}"#);

        assert_eq!(delivered, 2);
        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_ok());
        assert!(outsider_rx.try_recv().is_err());
    }

    #[test]
    fn broadcast_prunes_closed_sessions() {
        let registry = SubscriptionRegistry::new();
        let (live, _live_rx) = test_handle();
        let (dead, dead_rx) = test_handle();
        drop(dead_rx);

        registry.subscribe(Feed::Blocks, live);
        registry.subscribe(Feed::Blocks, dead.clone());
        assert_eq!(registry.subscriber_count(Feed::Blocks), 2);

        let delivered = registry.broadcast(Feed::Blocks, "frame");

        assert_eq!(delivered, 1);
        assert_eq!(registry.subscriber_count(Feed::Blocks), 1);
        assert!(!registry.is_subscribed(Feed::Blocks, &dead.id()));
    }

    #[test]
    fn broadcast_keeps_slow_sessions() {
        let registry = SubscriptionRegistry::new();
        let (slow, _slow_rx) = test_handle();
        registry.subscribe(Feed::Blocks, slow.clone());

        // Fill the 4-deep queue, then broadcast once more.
        for _ in 0..4 {
            registry.broadcast(Feed::Blocks, "frame");
        }
        let delivered = registry.broadcast(Feed::Blocks, "frame");

        // The frame was dropped but the membership survives.
        assert_eq!(delivered, 0);
        assert!(registry.is_subscribed(Feed::Blocks, &slow.id()));
    }

    #[test]
    fn subscriber_ids_reflect_membership() {
        let registry = SubscriptionRegistry::new();
        let (first, _a) = test_handle();
        let (second, _b) = test_handle();

        registry.subscribe(Feed::GlobalProperties, first.clone());
        registry.subscribe(Feed::GlobalProperties, second.clone());

        let ids = registry.subscriber_ids(Feed::GlobalProperties);
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id()));
        assert!(ids.contains(&second.id()));
    }
}
