//! Engine configuration.
//!
//! Loaded from environment variables with defaults suitable for
//! development. Every value can also be set with a `with_*` builder.

use crate::error::ConfigError;
use crate::page::DEFAULT_PAGE_SIZE;
use std::time::Duration;

/// Runtime configuration shared by every entity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of detached tasks (after-hooks, audit writes) running at once.
    pub detached_concurrency: usize,

    /// Page size used when a request does not specify one.
    pub default_page_size: u32,

    /// Upper bound applied to requested page sizes.
    pub max_page_size: u32,

    /// Global cache switch. When false every read goes to the repository.
    pub cache_enabled: bool,

    /// Fallback cache lifetime for entity types that do not set their own.
    pub default_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detached_concurrency: 16,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 500,
            cache_enabled: true,
            default_cache_ttl: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create EngineConfig from environment variables.
    ///
    /// Environment variables:
    /// - `STRATA_DETACHED_CONCURRENCY`: Concurrent detached tasks (default: 16)
    /// - `STRATA_DEFAULT_PAGE_SIZE`: Page size when unspecified (default: 20)
    /// - `STRATA_MAX_PAGE_SIZE`: Upper bound on page size (default: 500)
    /// - `STRATA_CACHE_ENABLED`: "true" or "false" (default: true)
    /// - `STRATA_CACHE_TTL_SECS`: Fallback cache lifetime (default: 1800)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let detached_concurrency = std::env::var("STRATA_DETACHED_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.detached_concurrency);

        let default_page_size = std::env::var("STRATA_DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_page_size);

        let max_page_size = std::env::var("STRATA_MAX_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_page_size);

        let cache_enabled = std::env::var("STRATA_CACHE_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.cache_enabled);

        let default_cache_ttl = std::env::var("STRATA_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_cache_ttl);

        Self {
            detached_concurrency,
            default_page_size,
            max_page_size,
            cache_enabled,
            default_cache_ttl,
        }
    }

    pub fn with_detached_concurrency(mut self, n: usize) -> Self {
        self.detached_concurrency = n;
        self
    }

    pub fn with_page_sizes(mut self, default_size: u32, max_size: u32) -> Self {
        self.default_page_size = default_size;
        self.max_page_size = max_size;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detached_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detached_concurrency".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_page_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                value: self.default_page_size.to_string(),
                reason: format!("must be between 1 and {}", self.max_page_size),
            });
        }
        Ok(())
    }
}
