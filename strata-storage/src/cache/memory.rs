//! In-memory named-cache backend.

use super::traits::{CacheBackend, CacheStats};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use strata_core::CacheError;

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// `DashMap`-backed cache with per-entry expiry and an optional per-cache
/// capacity. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    caches: DashMap<String, DashMap<String, CachedEntry>>,
    max_entries_per_cache: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    clears: AtomicU64,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap each named cache. The oldest entry is evicted when full.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries_per_cache = Some(max.max(1));
        self
    }

    /// Number of live (possibly expired) entries in a named cache.
    pub fn len(&self, cache: &str) -> usize {
        self.caches.get(cache).map(|c| c.len()).unwrap_or(0)
    }

    fn evict_oldest(&self, entries: &DashMap<String, CachedEntry>) {
        let oldest = entries
            .iter()
            .min_by_key(|e| e.value().inserted_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Cache full, evicted oldest entry");
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, cache: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        let Some(entries) = self.caches.get(cache) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let lookup = entries
            .get(key)
            .map(|e| (e.is_expired(now), e.value.clone()));

        match lookup {
            Some((false, value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some((true, _)) => {
                entries.remove(key);
                tracing::trace!(cache, key, "Expired cache entry removed");
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        cache: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let entries = self.caches.entry(cache.to_string()).or_default();

        if let Some(max) = self.max_entries_per_cache {
            if entries.len() >= max && !entries.contains_key(key) {
                self.evict_oldest(&entries);
            }
        }

        entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                inserted_at: now,
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn evict(&self, cache: &str, key: &str) -> Result<(), CacheError> {
        if let Some(entries) = self.caches.get(cache) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, cache: &str) -> Result<u64, CacheError> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        let removed = self
            .caches
            .remove(cache)
            .map(|(_, entries)| entries.len() as u64)
            .unwrap_or(0);
        Ok(removed)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let entry_count = self.caches.iter().map(|c| c.value().len() as u64).sum();
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        })
    }
}
