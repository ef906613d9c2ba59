//! Typed TTL key/value cache with hit-rate metrics. Grounded in the
//! single-purpose spread cache pattern (an `RwLock<HashMap<..>>` with
//! lock-poisoning recovery), generalized to an arbitrary JSON-serializable
//! value, pattern invalidation, and periodic sweep.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheMetrics {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_age_seconds: f64,
    pub expired_entries: usize,
}

pub enum CacheLookup<T> {
    Hit { value: T, age_seconds: f64 },
    Miss,
}

/// The cache contract every implementation (in-memory, SQLite-backed)
/// satisfies. `get`/`set` never propagate I/O errors to callers: a backend
/// failure degrades to a Miss (logged by the implementation), never a panic.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> CacheLookup<String>;
    async fn set_raw(&self, key: &str, value: String, ttl: Duration);
    async fn invalidate(&self, pattern: &str) -> usize;
    async fn cleanup_expired(&self) -> usize;
    fn metrics(&self) -> CacheMetrics;
}

/// Convenience typed wrapper over any `Cache` implementation.
pub async fn get<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> CacheLookup<T> {
    match cache.get_raw(key).await {
        CacheLookup::Hit { value, age_seconds } => match serde_json::from_str(&value) {
            Ok(parsed) => CacheLookup::Hit { value: parsed, age_seconds },
            Err(_) => CacheLookup::Miss,
        },
        CacheLookup::Miss => CacheLookup::Miss,
    }
}

pub async fn set<T: Serialize>(cache: &dyn Cache, key: &str, value: &T, ttl: Duration) {
    if let Ok(json) = serde_json::to_string(value) {
        cache.set_raw(key, json, ttl).await;
    }
}

/// In-process cache backed by an `RwLock<HashMap<..>>`. Reads never block on
/// writers beyond the lock acquisition; hit/miss counters are atomics so
/// `metrics()` never takes a lock at all.
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> CacheLookup<String> {
        let found = {
            let guard = self.read_lock();
            guard.get(key).filter(|e| !e.is_expired()).map(|e| (e.value.clone(), e.stored_at.elapsed().as_secs_f64()))
        };
        match found {
            Some((value, age)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if let Some(entry) = self.write_lock().get_mut(key) {
                    entry.hit_count += 1;
                }
                CacheLookup::Hit { value, age_seconds: age }
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) {
        self.write_lock().insert(
            key.to_string(),
            CacheEntry { value, stored_at: Instant::now(), ttl, hit_count: 0 },
        );
    }

    async fn invalidate(&self, pattern: &str) -> usize {
        let prefix = pattern.trim_end_matches('*');
        let mut guard = self.write_lock();
        let to_remove: Vec<String> = guard.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        for key in &to_remove {
            guard.remove(key);
        }
        to_remove.len()
    }

    async fn cleanup_expired(&self) -> usize {
        let mut guard = self.write_lock();
        let expired: Vec<String> = guard.iter().filter(|(_, e)| e.is_expired()).map(|(k, _)| k.clone()).collect();
        for key in &expired {
            guard.remove(key);
        }
        expired.len()
    }

    fn metrics(&self) -> CacheMetrics {
        let guard = self.read_lock();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        let expired_entries = guard.values().filter(|e| e.is_expired()).count();
        let avg_age_seconds = if guard.is_empty() {
            0.0
        } else {
            guard.values().map(|e| e.stored_at.elapsed().as_secs_f64()).sum::<f64>() / guard.len() as f64
        };
        CacheMetrics {
            entries: guard.len(),
            hits,
            misses,
            hit_rate,
            avg_age_seconds,
            expired_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[tokio::test]
    async fn set_then_get_returns_hit_with_age() {
        let cache = InMemoryCache::new();
        set(&cache, "spread:BTC", &12.5f64, Duration::from_secs(10)).await;
        match get::<f64>(&cache, "spread:BTC").await {
            CacheLookup::Hit { value, .. } => assert_eq!(value, 12.5),
            CacheLookup::Miss => panic!("expected hit"),
        }
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_counted() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", "1".to_string(), Duration::from_millis(1)).await;
        sleep(Duration::from_millis(20));
        match cache.get_raw("k").await {
            CacheLookup::Miss => {}
            CacheLookup::Hit { .. } => panic!("expected miss on expired entry"),
        }
        assert_eq!(cache.cleanup_expired().await, 1);
    }

    #[tokio::test]
    async fn invalidate_pattern_removes_matching_prefix() {
        let cache = InMemoryCache::new();
        cache.set_raw("orderbook:BTC", "a".into(), Duration::from_secs(60)).await;
        cache.set_raw("orderbook:ETH", "b".into(), Duration::from_secs(60)).await;
        cache.set_raw("funding:BTC", "c".into(), Duration::from_secs(60)).await;
        let removed = cache.invalidate("orderbook:*").await;
        assert_eq!(removed, 2);
        assert_eq!(cache.metrics().entries, 1);
    }

    #[tokio::test]
    async fn metrics_hit_rate_reflects_get_outcomes() {
        let cache = InMemoryCache::new();
        cache.set_raw("k", "v".into(), Duration::from_secs(60)).await;
        let _ = cache.get_raw("k").await;
        let _ = cache.get_raw("missing").await;
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hit_rate, 0.5);
    }
}
