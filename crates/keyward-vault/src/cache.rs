// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded record cache with TTL expiry and least-recently-used eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Counters exposed through [`CredentialVault::cache_stats`](crate::CredentialVault::cache_stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    access_count: u64,
    /// Logical clock value of the last touch; smallest is least recent.
    last_access: u64,
}

/// LRU cache whose entries also expire `ttl` after insertion.
///
/// Expired entries are never served; they are dropped on lookup and
/// before any eviction.
#[derive(Debug)]
pub struct LruTtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
    clock: u64,
    stats: CacheStats,
}

impl<K, V> LruTtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity),
            clock: 0,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }

    /// Look up `key`, counting a hit or a miss.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry),
        };
        if expired {
            self.entries.remove(key);
            self.stats.misses += 1;
            return None;
        }

        let now = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_access = now;
        self.stats.hits += 1;
        Some(entry.value.clone())
    }

    /// Insert or replace `key`, evicting the least recently used entry if
    /// the cache is full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_lru();
            }
        }
        let now = self.tick();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                access_count: 0,
                last_access: now,
            },
        );
    }

    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }

    /// Drop `key`. Returns whether it was cached.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times `key` has been served since insertion.
    pub fn access_count(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.access_count)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> LruTtlCache<String, u32> {
        LruTtlCache::new(capacity, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn hit_and_miss_are_counted() {
        let mut c = cache(4);
        assert_eq!(c.get(&"a".into()), None);
        c.insert("a".into(), 1);
        assert_eq!(c.get(&"a".into()), Some(1));
        assert_eq!(c.access_count(&"a".into()), Some(1));

        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn least_recently_used_is_evicted_first() {
        let mut c = cache(2);
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        // Touch "a" so "b" becomes the LRU entry.
        assert_eq!(c.get(&"a".into()), Some(1));
        c.insert("c".into(), 3);

        assert_eq!(c.get(&"b".into()), None);
        assert_eq!(c.get(&"a".into()), Some(1));
        assert_eq!(c.get(&"c".into()), Some(3));
        assert_eq!(c.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_does_not_evict() {
        let mut c = cache(2);
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        c.insert("a".into(), 10);
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"a".into()), Some(10));
        assert_eq!(c.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_never_served() {
        let mut c = cache(4);
        c.insert("a".into(), 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(c.get(&"a".into()), None);
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_purges_expired_before_evicting() {
        let mut c = cache(2);
        c.insert("old".into(), 1);
        tokio::time::advance(Duration::from_secs(45)).await;
        c.insert("young".into(), 2);
        tokio::time::advance(Duration::from_secs(20)).await;

        c.insert("new".into(), 3);
        assert_eq!(c.stats().evictions, 0);
        assert_eq!(c.get(&"young".into()), Some(2));
    }

    #[test]
    fn invalidate_reports_presence() {
        let mut c = cache(2);
        c.insert("a".into(), 1);
        assert!(c.invalidate(&"a".into()));
        assert!(!c.invalidate(&"a".into()));
    }
}
