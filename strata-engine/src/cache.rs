//! Cache layer façade.
//!
//! Wraps a [`CacheBackend`] with typed access and a fail-open policy: every
//! backend or (de)serialization failure is logged and turned into a miss or
//! a no-op. Cache unavailability never fails a request.
//!
//! # Staleness
//!
//! The cache is not part of the write's atomicity boundary. Between a write
//! committing and the cache clear that follows it, a concurrent reader can
//! still be served the previous value. That window is the accepted
//! staleness bound.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{EntityDescriptor, FilterParams, PageRequest};
use strata_storage::{CacheBackend, CacheStats};

/// Cache key: `operation[:tenant=<id>]:<sha256 of canonical params>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from an operation name, optional tenant and a canonical
    /// rendering of the operation parameters.
    pub fn new(operation: &str, tenant: Option<&str>, params: &str) -> Self {
        let hash = hex::encode(Sha256::digest(params.as_bytes()));
        match tenant {
            Some(tenant) => Self(format!("{operation}:tenant={tenant}:{hash}")),
            None => Self(format!("{operation}:{hash}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Render filters and page as `k=v&...|page=..&size=..`.
///
/// `FilterParams` iterates in key order, so equal filter maps render equally.
/// `%`, `&`, `=` and `|` inside keys and values are percent-escaped.
pub fn canonical_params(filters: &FilterParams, page: &PageRequest) -> String {
    let rendered: Vec<String> = filters
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect();
    format!("{}|{}", rendered.join("&"), page)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '|' => out.push_str("%7C"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed, fail-open access to one named cache per entity type.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    enabled: bool,
    default_ttl: Duration,
}

impl fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("enabled", &self.enabled)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, enabled: bool, default_ttl: Duration) -> Self {
        Self {
            backend,
            enabled,
            default_ttl,
        }
    }

    fn active(&self, descriptor: &EntityDescriptor) -> bool {
        self.enabled && descriptor.cached()
    }

    fn ttl_for(&self, descriptor: &EntityDescriptor) -> Duration {
        if descriptor.cache_ttl_secs == 0 {
            self.default_ttl
        } else {
            descriptor.cache_ttl()
        }
    }

    /// Typed lookup. Any failure reads as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        descriptor: &EntityDescriptor,
        key: &CacheKey,
    ) -> Option<T> {
        if !self.active(descriptor) {
            return None;
        }

        let cache = descriptor.name;
        match self.backend.get(cache, key.as_str()).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(typed) => {
                    tracing::debug!(cache, key = %key, "Cache hit");
                    Some(typed)
                }
                Err(e) => {
                    tracing::warn!(cache, key = %key, error = %e, "Cached value did not deserialize");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(cache, key = %key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(cache, key = %key, error = %e, "Cache get failed");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, descriptor: &EntityDescriptor, key: &CacheKey, value: &T) {
        if !self.active(descriptor) {
            return;
        }

        let cache = descriptor.name;
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(cache, key = %key, error = %e, "Value did not serialize for cache");
                return;
            }
        };
        if let Err(e) = self
            .backend
            .put(cache, key.as_str(), value, Some(self.ttl_for(descriptor)))
            .await
        {
            tracing::warn!(cache, key = %key, error = %e, "Cache put failed");
        }
    }

    /// Drop one key. Writes never evict single keys; they [`clear`](Self::clear)
    /// the whole named cache, since any write can change any cached page.
    pub async fn evict(&self, descriptor: &EntityDescriptor, key: &CacheKey) {
        if !self.active(descriptor) {
            return;
        }
        if let Err(e) = self.backend.evict(descriptor.name, key.as_str()).await {
            tracing::warn!(cache = descriptor.name, key = %key, error = %e, "Cache evict failed");
        }
    }

    /// Drop every entry of the entity type's named cache.
    pub async fn clear(&self, descriptor: &EntityDescriptor) {
        if !self.active(descriptor) {
            return;
        }
        match self.backend.clear(descriptor.name).await {
            Ok(removed) => tracing::debug!(cache = descriptor.name, removed, "Cache cleared"),
            Err(e) => tracing::warn!(cache = descriptor.name, error = %e, "Cache clear failed"),
        }
    }

    /// Backend statistics, `None` if the backend cannot report them.
    pub async fn stats(&self) -> Option<CacheStats> {
        match self.backend.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "Cache stats unavailable");
                None
            }
        }
    }
}
