//! Tiered in-memory cache with per-entity freshness windows.
//!
//! Two shapes of storage back the gateway's read methods:
//!
//! - **Singleton slots** for head state and the active-witness list. A slot
//!   read either hits (fresh), refreshes (expired), or degrades: if the
//!   refresh fails and a stale value is present, the stale value is served
//!   silently. Freshness is best-effort; availability wins.
//! - **Bounded maps** for per-block artifacts (headers, blocks, operations).
//!   Blocks past the head are immutable, so entries never change once
//!   stored; expired entries are removed on lookup, and insertion evicts the
//!   oldest-inserted entry when a map is at its bound.
//!
//! # TTL Strategy
//!
//! | Cache | Default TTL | Rationale |
//! |-------|-------------|-----------|
//! | Head slot | 3 s | Tracks the block interval |
//! | Witness slot | 5 min | Witness schedule changes slowly |
//! | Header/block/ops maps | 5 min | Immutable data, bounded memory |
//!
//! # Concurrency
//!
//! One lock per slot and per map; locks are never held across an upstream
//! await. Counters are relaxed atomics.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use steem_rpc::DynamicGlobalProperties;

use crate::config::CacheSettings;

// ═══════════════════════════════════════════════════════════════════════════════
// STORED VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// A cached value plus the instant it was stored.
#[derive(Debug, Clone)]
struct Stored<T> {
    value: T,
    stored_at: Instant,
}

impl<T> Stored<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLETON SLOT
// ═══════════════════════════════════════════════════════════════════════════════

/// A singleton cache slot with stale-on-error semantics.
#[derive(Debug)]
pub struct Slot<T> {
    inner: RwLock<Option<Stored<T>>>,
}

impl<T: Clone> Slot<T> {
    /// Create an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Return the value if it is within `ttl`.
    fn get_fresh(&self, ttl: Duration) -> Option<T> {
        self.inner
            .read()
            .as_ref()
            .filter(|stored| stored.is_fresh(ttl))
            .map(|stored| stored.value.clone())
    }

    /// Return the value and its age regardless of freshness.
    ///
    /// Does not touch the hit/miss counters; used for immediate
    /// subscription snapshots and `/status` freshness reporting.
    #[must_use]
    pub fn peek(&self) -> Option<(T, Duration)> {
        self.inner
            .read()
            .as_ref()
            .map(|stored| (stored.value.clone(), stored.stored_at.elapsed()))
    }

    /// Return the stale value, if any.
    fn get_stale(&self) -> Option<T> {
        self.inner.read().as_ref().map(|s| s.value.clone())
    }

    /// Store a new value, stamped now.
    pub fn store(&self, value: T) {
        *self.inner.write() = Some(Stored::new(value));
    }

    /// Drop the stored value.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BOUNDED MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// An insertion-ordered map with a size bound and TTL checked on lookup.
///
/// Eviction is FIFO on insertion order, which approximates LRU for the
/// gateway's access pattern (recent blocks are the hot set). The bound holds
/// at every observation point: `len() <= bound` always.
#[derive(Debug)]
pub struct BoundedMap<K, V> {
    entries: HashMap<K, Stored<V>>,
    order: VecDeque<K>,
    bound: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedMap<K, V> {
    /// Create an empty map with the given size bound.
    #[must_use]
    pub fn new(bound: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(bound.min(1024)),
            order: VecDeque::with_capacity(bound.min(1024)),
            bound,
        }
    }

    /// Look up a key, removing and missing entries older than `ttl`.
    pub fn get(&mut self, key: &K, ttl: Duration) -> Option<V> {
        match self.entries.get(key) {
            Some(stored) if stored.is_fresh(ttl) => Some(stored.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                self.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, evicting the oldest-inserted entry at the bound.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            // Refresh in place; insertion order is unchanged.
            self.entries.insert(key, Stored::new(value));
            return;
        }

        while self.entries.len() >= self.bound {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, Stored::new(value));
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-through outcome counters. All counters are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Reads served from fresh cached data.
    pub hits: u64,
    /// Reads that required an upstream fetch.
    pub misses: u64,
    /// Reads served stale because the refresh failed.
    pub degraded_hits: u64,
    /// Live entries in the header map.
    pub header_entries: usize,
    /// Live entries in the block map.
    pub block_entries: usize,
    /// Live entries in the operations map.
    pub ops_entries: usize,
}

impl CacheStats {
    /// Upstream calls avoided by the cache: every hit, fresh or degraded.
    #[must_use]
    pub const fn calls_saved(&self) -> u64 {
        self.hits + self.degraded_hits
    }
}

/// The gateway's tiered cache.
///
/// Owned by the server state and shared by the dispatcher and poll driver.
/// [`clear_all`](Self::clear_all) exists for the upstream pool: after a
/// failover, a different endpoint may disagree on not-yet-irreversible
/// heights, so dependent caches are dropped.
#[derive(Debug)]
pub struct GatewayCache {
    /// Head-state slot.
    head: Slot<DynamicGlobalProperties>,
    /// Active-witness-list slot.
    witnesses: Slot<Vec<String>>,
    /// Block headers by height.
    headers: Mutex<BoundedMap<u64, Value>>,
    /// Full blocks by height.
    blocks: Mutex<BoundedMap<u64, Value>>,
    /// Operations by (height, only-virtual flag).
    ops: Mutex<BoundedMap<(u64, bool), Value>>,

    /// TTLs and bounds.
    settings: CacheSettings,

    /// Cache hit counter.
    hits: AtomicU64,
    /// Cache miss counter.
    misses: AtomicU64,
    /// Degraded hit counter (stale served on refresh failure).
    degraded_hits: AtomicU64,
}

impl GatewayCache {
    /// Create an empty cache from settings.
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        let bound = settings.max_entries_per_map;
        Self {
            head: Slot::new(),
            witnesses: Slot::new(),
            headers: Mutex::new(BoundedMap::new(bound)),
            blocks: Mutex::new(BoundedMap::new(bound)),
            ops: Mutex::new(BoundedMap::new(bound)),
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            degraded_hits: AtomicU64::new(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SLOT READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read the head state through the cache.
    ///
    /// Fresh slot → hit. Expired → `refresh` is awaited without holding any
    /// lock; success stores and counts a miss, failure with a stale value
    /// present serves it as a degraded hit.
    ///
    /// # Errors
    ///
    /// Propagates the refresh error only when no stale value exists.
    pub async fn head_state<F, Fut, E>(&self, refresh: F) -> Result<DynamicGlobalProperties, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DynamicGlobalProperties, E>>,
    {
        let ttl = self.settings.head_ttl();

        if let Some(value) = self.head.get_fresh(ttl) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        match refresh().await {
            Ok(value) => {
                self.head.store(value.clone());
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => match self.head.get_stale() {
                Some(stale) => {
                    self.degraded_hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Head refresh failed, serving stale value");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Read the active-witness list through the cache.
    ///
    /// Same hit/miss/degraded semantics as [`head_state`](Self::head_state).
    ///
    /// # Errors
    ///
    /// Propagates the refresh error only when no stale value exists.
    pub async fn active_witnesses<F, Fut, E>(&self, refresh: F) -> Result<Vec<String>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>, E>>,
    {
        let ttl = self.settings.witness_ttl();

        if let Some(value) = self.witnesses.get_fresh(ttl) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        match refresh().await {
            Ok(value) => {
                self.witnesses.store(value.clone());
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => match self.witnesses.get_stale() {
                Some(stale) => {
                    self.degraded_hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Witness refresh failed, serving stale value");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }

    /// Peek the head slot without touching counters.
    #[must_use]
    pub fn peek_head(&self) -> Option<(DynamicGlobalProperties, Duration)> {
        self.head.peek()
    }

    /// Peek the witness slot without touching counters.
    #[must_use]
    pub fn peek_witnesses(&self) -> Option<(Vec<String>, Duration)> {
        self.witnesses.peek()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BOUNDED MAP READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get a cached block header.
    #[must_use]
    pub fn get_block_header(&self, height: u64) -> Option<Value> {
        let result = self.headers.lock().get(&height, self.settings.block_ttl());
        self.count_lookup(result.is_some());
        result
    }

    /// Cache a block header.
    pub fn put_block_header(&self, height: u64, header: Value) {
        self.headers.lock().insert(height, header);
    }

    /// Get a cached full block.
    #[must_use]
    pub fn get_block(&self, height: u64) -> Option<Value> {
        let result = self.blocks.lock().get(&height, self.settings.block_ttl());
        self.count_lookup(result.is_some());
        result
    }

    /// Cache a full block.
    pub fn put_block(&self, height: u64, block: Value) {
        self.blocks.lock().insert(height, block);
    }

    /// Get cached operations for a block.
    #[must_use]
    pub fn get_ops(&self, height: u64, only_virtual: bool) -> Option<Value> {
        let result = self
            .ops
            .lock()
            .get(&(height, only_virtual), self.settings.block_ttl());
        self.count_lookup(result.is_some());
        result
    }

    /// Cache operations for a block.
    pub fn put_ops(&self, height: u64, only_virtual: bool, ops: Value) {
        self.ops.lock().insert((height, only_virtual), ops);
    }

    fn count_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Drop every cached value.
    ///
    /// Called after an upstream failover. The counters are monotonic and
    /// survive the clear.
    pub fn clear_all(&self) {
        self.head.clear();
        self.witnesses.clear();
        self.headers.lock().clear();
        self.blocks.lock().clear();
        self.ops.lock().clear();
        debug!("Cleared all caches");
    }

    /// Snapshot the counters and map sizes.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded_hits: self.degraded_hits.load(Ordering::Relaxed),
            header_entries: self.headers.lock().len(),
            block_entries: self.blocks.lock().len(),
            ops_entries: self.ops.lock().len(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn test_settings() -> CacheSettings {
        CacheSettings {
            head_ttl_ms: 3000,
            witness_ttl_ms: 300_000,
            block_ttl_ms: 300_000,
            max_entries_per_map: 3,
        }
    }

    fn sample_props(height: u64) -> DynamicGlobalProperties {
        serde_json::from_value(json!({
            "head_block_number": height,
            "time": "2021-01-01T00:00:00"
        }))
        .unwrap()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SLOT TESTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn head_miss_then_hit() {
        let cache = GatewayCache::new(test_settings());

        let first = cache
            .head_state(|| async { Ok::<_, ()>(sample_props(10)) })
            .await
            .unwrap();
        assert_eq!(first.head_block_number, 10);
        assert_eq!(cache.stats().misses, 1);

        // Second read within the TTL must not invoke the refresh: the
        // poisoned height 99 would show up in the result if it ran.
        let second = cache
            .head_state(|| async { Ok::<_, ()>(sample_props(99)) })
            .await
            .unwrap();
        assert_eq!(second.head_block_number, 10);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn head_degraded_hit_on_refresh_failure() {
        let mut settings = test_settings();
        settings.head_ttl_ms = 0; // every read refreshes
        let cache = GatewayCache::new(settings);

        cache
            .head_state(|| async { Ok::<_, String>(sample_props(10)) })
            .await
            .unwrap();

        // Refresh fails; the stale value is served and counted as degraded.
        let degraded = cache
            .head_state(|| async { Err::<DynamicGlobalProperties, _>("upstream down".to_string()) })
            .await
            .unwrap();
        assert_eq!(degraded.head_block_number, 10);

        let stats = cache.stats();
        assert_eq!(stats.degraded_hits, 1);
        assert_eq!(stats.calls_saved(), 1);
    }

    #[tokio::test]
    async fn head_error_surfaces_without_stale_value() {
        let cache = GatewayCache::new(test_settings());

        let result = cache
            .head_state(|| async { Err::<DynamicGlobalProperties, _>("down".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(cache.stats().degraded_hits, 0);
    }

    #[tokio::test]
    async fn witnesses_cache_and_peek() {
        let cache = GatewayCache::new(test_settings());
        assert!(cache.peek_witnesses().is_none());

        let list = vec!["alice".to_string(), "bob".to_string()];
        let fetched = cache
            .active_witnesses(|| async { Ok::<_, ()>(list.clone()) })
            .await
            .unwrap();
        assert_eq!(fetched, list);

        let (peeked, age) = cache.peek_witnesses().unwrap();
        assert_eq!(peeked, list);
        assert!(age < Duration::from_secs(1));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BOUNDED MAP TESTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn bounded_map_get_and_insert() {
        let mut map: BoundedMap<u64, &str> = BoundedMap::new(10);
        let ttl = Duration::from_secs(60);

        assert!(map.get(&1, ttl).is_none());
        map.insert(1, "one");
        assert_eq!(map.get(&1, ttl), Some("one"));
    }

    #[test]
    fn bounded_map_expired_entries_are_removed() {
        let mut map: BoundedMap<u64, &str> = BoundedMap::new(10);

        map.insert(1, "one");
        // Zero TTL: the entry is expired on the very next lookup.
        assert!(map.get(&1, Duration::ZERO).is_none());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn bounded_map_evicts_oldest_at_bound() {
        let mut map: BoundedMap<u64, u64> = BoundedMap::new(3);
        let ttl = Duration::from_secs(60);

        for i in 0..5u64 {
            map.insert(i, i * 10);
            assert!(map.len() <= 3, "bound exceeded at insert {i}");
        }

        // Oldest two were evicted.
        assert!(map.get(&0, ttl).is_none());
        assert!(map.get(&1, ttl).is_none());
        assert_eq!(map.get(&2, ttl), Some(20));
        assert_eq!(map.get(&4, ttl), Some(40));
    }

    #[test]
    fn bounded_map_replace_keeps_len() {
        let mut map: BoundedMap<u64, &str> = BoundedMap::new(3);
        map.insert(1, "one");
        map.insert(1, "uno");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1, Duration::from_secs(60)), Some("uno"));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GATEWAY CACHE TESTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn block_artifacts_are_cached_per_key() {
        let cache = GatewayCache::new(test_settings());

        cache.put_block_header(100, json!({"previous": "00..."}));
        cache.put_block(100, json!({"transactions": []}));
        cache.put_ops(100, false, json!([]));
        cache.put_ops(100, true, json!([{"virtual": true}]));

        assert!(cache.get_block_header(100).is_some());
        assert!(cache.get_block(100).is_some());

        // The only-virtual flag is part of the key.
        assert_eq!(cache.get_ops(100, false), Some(json!([])));
        assert_eq!(cache.get_ops(100, true), Some(json!([{"virtual": true}])));
        assert!(cache.get_ops(101, false).is_none());
    }

    #[test]
    fn repeated_reads_return_identical_payloads() {
        let cache = GatewayCache::new(test_settings());
        let block = json!({"transactions": [{"op": "vote"}], "witness": "alice"});

        cache.put_block(42, block.clone());
        let first = cache.get_block(42).unwrap();
        let second = cache.get_block(42).unwrap();

        assert_eq!(first, block);
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn maps_respect_bound() {
        let cache = GatewayCache::new(test_settings()); // bound 3

        for h in 0..20u64 {
            cache.put_block(h, json!(h));
            cache.put_block_header(h, json!(h));
            cache.put_ops(h, false, json!(h));

            let stats = cache.stats();
            assert!(stats.block_entries <= 3);
            assert!(stats.header_entries <= 3);
            assert!(stats.ops_entries <= 3);
        }
    }

    #[test]
    fn clear_all_preserves_counters() {
        let cache = GatewayCache::new(test_settings());

        cache.put_block(1, json!({}));
        cache.get_block(1); // hit
        cache.get_block(2); // miss

        let before = cache.stats();
        assert_eq!(before.hits, 1);
        assert_eq!(before.misses, 1);

        cache.clear_all();

        let after = cache.stats();
        assert_eq!(after.block_entries, 0);
        // Counters are monotonic across clears.
        assert_eq!(after.hits, 1);
        assert_eq!(after.misses, 1);
        assert!(cache.peek_head().is_none());
    }
}
