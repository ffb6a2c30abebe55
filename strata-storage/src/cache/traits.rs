//! Cache backend trait and statistics.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use strata_core::CacheError;

/// Named-cache backend.
///
/// This trait abstracts over different cache backends (in-memory, Redis,
/// a distributed cache). Implementations must be thread-safe and support
/// concurrent access.
///
/// # Naming
///
/// Caches are addressed by name; the engine uses one named cache per
/// entity type and clears it wholesale on every write.
///
/// # Serialization
///
/// Values are exchanged as `serde_json::Value`, which keeps the trait
/// object-safe. Typed (de)serialization happens in the engine's cache layer.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value, or `None` on miss or expiry.
    async fn get(&self, cache: &str, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store a value. `ttl` of `None` means no expiry beyond eviction.
    async fn put(
        &self,
        cache: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Remove a single key.
    async fn evict(&self, cache: &str, key: &str) -> Result<(), CacheError>;

    /// Remove every key of a named cache. Returns the number removed.
    async fn clear(&self, cache: &str) -> Result<u64, CacheError>;

    /// Get cache statistics.
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries removed by expiry or capacity.
    pub evictions: u64,
    /// Number of whole-cache clears.
    pub clears: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
