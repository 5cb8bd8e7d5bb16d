//! In-memory response cache.
//!
//! ## Features
//!
//! - **TTL Support**: entries expire relative to an injected [`Clock`]
//! - **LRU Eviction**: least-recently-used entry is dropped when full
//! - **Bounded Size**: maximum entry count enforced on insert
//! - **Tag Index**: every entry carrying a tag can be dropped at once

use crate::config::CacheConfig;
use chrono::{DateTime, Utc};
use mediator_core::environment::{Clock, SystemClock};
use mediator_core::{BoxFuture, CacheError, CacheStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Stored value with expiry and recency bookkeeping
#[derive(Clone, Debug)]
struct CacheEntry {
    value: Vec<u8>,
    tags: Vec<String>,
    expires_at: DateTime<Utc>,
    last_access: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    tags: HashMap<String, HashSet<String>>,
    access_counter: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.remove_entry(&key);
        }
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = lru_key {
            tracing::trace!(key = %key, "Evicting least recently used cache entry");
            self.remove_entry(&key);
            self.evictions += 1;
        }
    }
}

/// Cache statistics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries (including expired ones not yet swept)
    pub size: usize,
    /// Maximum capacity
    pub capacity: usize,
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
}

/// Bounded, thread-safe [`CacheStore`] held in process memory.
///
/// Cloning shares the same underlying storage.
#[derive(Clone)]
pub struct InMemoryCacheStore {
    capacity: usize,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState>>,
}

impl InMemoryCacheStore {
    /// Create a store that holds at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Create a store whose expiry follows `clock`
    #[must_use]
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity: capacity.max(1),
            clock,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Create a store sized from configuration
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.tags.clear();
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl std::fmt::Debug for InMemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheStore")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>, CacheError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut state = self.state.lock().await;

            let expired = match state.entries.get(key) {
                Some(entry) => entry.is_expired(now),
                None => {
                    state.misses += 1;
                    return Ok(None);
                }
            };
            if expired {
                state.remove_entry(key);
                state.misses += 1;
                return Ok(None);
            }

            let access = state.next_access();
            state.hits += 1;
            Ok(state.entries.get_mut(key).map(|entry| {
                entry.last_access = access;
                entry.value.clone()
            }))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Vec<u8>,
        ttl: Duration,
        tags: &'a [String],
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let expires_at = self.expiry(ttl);
            let mut state = self.state.lock().await;

            state.remove_entry(key);
            state.evict_expired(now);
            while state.entries.len() >= self.capacity {
                state.evict_lru();
            }

            for tag in tags {
                state
                    .tags
                    .entry(tag.clone())
                    .or_default()
                    .insert(key.to_string());
            }
            let last_access = state.next_access();
            state.entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    tags: tags.to_vec(),
                    expires_at,
                    last_access,
                },
            );
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            self.state.lock().await.remove_entry(key);
            Ok(())
        })
    }

    fn invalidate_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize, CacheError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let keys = state.tags.remove(tag).unwrap_or_default();
            let removed = keys
                .iter()
                .filter(|key| state.remove_entry(key).is_some())
                .count();
            tracing::debug!(tag, removed, "Invalidated cache tag");
            Ok(removed)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    /// Clock moved forward by hand
    struct SteppingClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl SteppingClock {
        fn new() -> Self {
            Self {
                now: StdMutex::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_cache_basic() {
        let cache = InMemoryCacheStore::new(2);

        cache.set("key1", b"value1".to_vec(), MINUTE, &[]).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_lru_eviction() {
        let cache = InMemoryCacheStore::new(2);

        cache.set("key1", b"1".to_vec(), MINUTE, &[]).await.unwrap();
        cache.set("key2", b"2".to_vec(), MINUTE, &[]).await.unwrap();

        // Access key1 to make it more recent
        let _ = cache.get("key1").await.unwrap();

        // Insert key3, should evict key2 (LRU)
        cache.set("key3", b"3".to_vec(), MINUTE, &[]).await.unwrap();

        assert!(cache.get("key1").await.unwrap().is_some());
        assert!(cache.get("key2").await.unwrap().is_none());
        assert!(cache.get("key3").await.unwrap().is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_cache_ttl() {
        let clock = Arc::new(SteppingClock::new());
        let cache = InMemoryCacheStore::with_clock(10, Arc::clone(&clock) as Arc<dyn Clock>);

        cache.set("key1", b"1".to_vec(), Duration::from_secs(600), &[]).await.unwrap();
        clock.advance(Duration::from_secs(599));
        assert!(cache.get("key1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("key1").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_tags() {
        let cache = InMemoryCacheStore::new(4);
        let old_tags = vec!["old".to_string()];

        cache.set("key", b"a".to_vec(), MINUTE, &old_tags).await.unwrap();
        cache.set("key", b"b".to_vec(), MINUTE, &[]).await.unwrap();

        assert_eq!(cache.invalidate_tag("old").await.unwrap(), 0);
        assert_eq!(cache.get("key").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_tag() {
        let cache = InMemoryCacheStore::new(10);
        let products = vec!["products".to_string()];
        let both = vec!["products".to_string(), "featured".to_string()];

        cache.set("p1", b"1".to_vec(), MINUTE, &products).await.unwrap();
        cache.set("p2", b"2".to_vec(), MINUTE, &both).await.unwrap();
        cache.set("other", b"3".to_vec(), MINUTE, &[]).await.unwrap();

        assert_eq!(cache.invalidate_tag("products").await.unwrap(), 2);
        assert_eq!(cache.invalidate_tag("featured").await.unwrap(), 0);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let cache = InMemoryCacheStore::new(10);
        cache.set("a", b"1".to_vec(), MINUTE, &[]).await.unwrap();
        cache.set("b", b"2".to_vec(), MINUTE, &[]).await.unwrap();

        cache.remove("a").await.unwrap();
        cache.remove("never-existed").await.unwrap();
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = InMemoryCacheStore::from_config(&CacheConfig::default());

        cache.set("key1", b"1".to_vec(), MINUTE, &[]).await.unwrap();
        let _ = cache.get("key1").await.unwrap();
        let _ = cache.get("key2").await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 10_000);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
