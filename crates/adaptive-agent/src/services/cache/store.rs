use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::entry::Entry;
use crate::utils::ScheduledTask;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub default_ttl_ms: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_ttl_ms: 5 * 60 * 1000,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub mean_access_count: f64,
    pub mean_age_ms: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    evictions: AtomicU64,
    expirations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct Inner<V> {
    map: HashMap<String, Entry<V>>,
    seq: u64,
}

impl<V> Inner<V> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// TTL + LRU key/value cache. Never fails: absence is a normal outcome.
pub struct CacheStore<V = serde_json::Value> {
    inner: Mutex<Inner<V>>,
    counters: Counters,
    config: CacheConfig,
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::with_capacity(config.capacity.min(4096)),
                seq: 0,
            }),
            counters: Counters::default(),
            config,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.config.default_ttl_ms)
    }

    /// Insert or overwrite `key`. A new key at capacity first drops expired
    /// entries and only then evicts the least recently accessed one;
    /// overwriting never evicts.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        let now = Instant::now();

        let mut inner = self.inner.lock();
        let seq = inner.next_seq();

        if !inner.map.contains_key(&key) && inner.map.len() >= self.config.capacity {
            let before = inner.map.len();
            inner.map.retain(|_, e| !e.is_expired(now));
            let expired = before - inner.map.len();
            if expired > 0 {
                self.counters.expirations.fetch_add(expired as u64, Ordering::Relaxed);
                debug!(expired, "Cache made room by dropping expired entries");
            }
        }

        if !inner.map.contains_key(&key) && inner.map.len() >= self.config.capacity {
            let victim = inner
                .map
                .iter()
                .min_by_key(|(_, e)| (e.touched_at, e.touched_seq))
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                inner.map.remove(&victim);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, "Cache evicted least recently used entry");
            }
        }

        inner.map.insert(key, Entry::new(value, ttl, now, seq));
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();

        match inner.map.get(key).map(|e| e.is_expired(now)) {
            Some(false) => {
                let entry = inner.map.get_mut(key)?;
                entry.touch(now, seq);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(true) => {
                inner.map.remove(key);
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Presence check. Expires lazily but does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        match inner.map.get(key).map(|e| e.is_expired(now)) {
            None => false,
            Some(false) => true,
            Some(true) => {
                inner.map.remove(key);
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().map.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().map.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.map.len();
        inner.map.retain(|_, e| !e.is_expired(now));
        let removed = before - inner.map.len();

        if removed > 0 {
            self.counters.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = inner.map.len(), "Cache sweep removed expired entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        let size = inner.map.len();

        let (access_sum, age_sum) = inner.map.values().fold((0u64, 0f64), |(a, g), e| {
            (a + e.access_count, g + e.age(now).as_secs_f64() * 1000.0)
        });
        let (mean_access_count, mean_age_ms) = if size == 0 {
            (0.0, 0.0)
        } else {
            (access_sum as f64 / size as f64, age_sum / size as f64)
        };

        CacheStats {
            size,
            capacity: self.config.capacity,
            mean_access_count,
            mean_age_ms,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    /// Start the periodic expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> ScheduledTask {
        let store = Arc::clone(self);
        ScheduledTask::spawn(
            "cache-sweeper",
            Duration::from_secs(self.config.sweep_interval_secs),
            move || {
                store.sweep_expired();
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(capacity: usize) -> CacheStore {
        CacheStore::new(CacheConfig {
            capacity,
            ..CacheConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_until_ttl() {
        let cache = store(10);
        cache.set("a", json!(1), Some(Duration::from_millis(50)));
        assert_eq!(cache.get("a"), Some(json!(1)));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_least_recently_accessed() {
        let cache = store(3);
        cache.set("a", json!("a"), None);
        cache.set("b", json!("b"), None);
        cache.set("c", json!("c"), None);
        assert!(cache.get("a").is_some());

        cache.set("d", json!("d"), None);

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.has("c"));
        assert!(cache.has("d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_at_capacity_prefers_dropping_expired_entries() {
        let cache = store(3);
        cache.set("live", json!(1), Some(Duration::from_secs(600)));
        cache.set("stale", json!(2), Some(Duration::from_millis(10)));
        cache.set("recent", json!(3), Some(Duration::from_secs(600)));
        assert!(cache.get("recent").is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.set("new", json!(4), None);

        // "live" is the least recently used, but the expired entry goes first
        assert!(cache.has("live"));
        assert!(cache.has("recent"));
        assert!(cache.has("new"));
        assert!(!cache.has("stale"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_at_capacity_never_evicts() {
        let cache = store(2);
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        cache.set("a", json!(3), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(3)));
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_has_does_not_refresh_recency() {
        let cache = store(2);
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        assert!(cache.has("a"));

        cache.set("c", json!(3), None);
        assert!(!cache.has("a"));
        assert!(cache.has("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_hits_and_misses() {
        let cache = store(10);
        cache.set("k", json!({"x": 1}), None);
        cache.get("k");
        cache.get("k");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.mean_access_count, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_clear() {
        let cache = store(10);
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(store(10));
        cache.set("short", json!(1), Some(Duration::from_secs(1)));
        cache.set("long", json!(2), Some(Duration::from_secs(600)));

        let sweeper = cache.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.has("long"));
        sweeper.stop().await;
    }
}
