//! Per-entity-type descriptors and the static route table.
//!
//! Each entity type declares a `const` [`EntityDescriptor`] naming its
//! route prefix and capability flags. A [`RouteTable`] is assembled from
//! those descriptors once, at startup, and never mutated afterwards.

use crate::error::ConfigError;
use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

bitflags! {
    /// Cross-cutting policies enabled for an entity type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Delete marks rows instead of removing them
        const SOFT_DELETE  = 0b0001;
        /// Operations are written to the audit trail
        const AUDIT        = 0b0010;
        /// Reads are served through the named cache
        const CACHE        = 0b0100;
        /// Rows are isolated by the caller's tenant
        const MULTI_TENANT = 0b1000;
    }
}

impl Capabilities {
    /// Soft delete, audit and cache. Multi-tenancy is opt-in.
    pub const DEFAULT: Capabilities = Capabilities::SOFT_DELETE
        .union(Capabilities::AUDIT)
        .union(Capabilities::CACHE);
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Default cache lifetime for an entity type (30 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30 * 60;

/// Static description of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity-type name, also used as the cache name and audit entity name
    pub name: &'static str,
    /// Route prefix exposed by the transport layer (e.g. "/api/invoices")
    pub route: &'static str,
    /// Enabled policies
    pub capabilities: Capabilities,
    /// Cache lifetime in seconds; 0 defers to the engine default
    pub cache_ttl_secs: u64,
    /// Fields accepted by the filter compiler. Empty means any known field.
    pub searchable_fields: &'static [&'static str],
    /// Fields accepted for sorting. Empty means any known field.
    pub sortable_fields: &'static [&'static str],
}

impl EntityDescriptor {
    /// Create a descriptor with default capabilities.
    pub const fn new(name: &'static str, route: &'static str) -> Self {
        Self {
            name,
            route,
            capabilities: Capabilities::DEFAULT,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            searchable_fields: &[],
            sortable_fields: &[],
        }
    }

    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub const fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub const fn with_searchable_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.searchable_fields = fields;
        self
    }

    pub const fn with_sortable_fields(mut self, fields: &'static [&'static str]) -> Self {
        self.sortable_fields = fields;
        self
    }

    pub fn soft_delete(&self) -> bool {
        self.capabilities.contains(Capabilities::SOFT_DELETE)
    }

    pub fn audited(&self) -> bool {
        self.capabilities.contains(Capabilities::AUDIT)
    }

    pub fn cached(&self) -> bool {
        self.capabilities.contains(Capabilities::CACHE)
    }

    pub fn multi_tenant(&self) -> bool {
        self.capabilities.contains(Capabilities::MULTI_TENANT)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Permission key for an action, e.g. `invoice:delete`.
    pub fn permission_key(&self, action: &str) -> String {
        format!("{}:{}", self.name.to_lowercase(), action)
    }

    pub fn is_searchable(&self, field: &str) -> bool {
        self.searchable_fields.is_empty() || self.searchable_fields.iter().any(|f| *f == field)
    }

    pub fn is_sortable(&self, field: &str) -> bool {
        self.sortable_fields.is_empty() || self.sortable_fields.iter().any(|f| *f == field)
    }
}

// ============================================================================
// ROUTE TABLE
// ============================================================================

static ROUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/[a-z0-9][a-z0-9/_-]*$").expect("Invalid route regex")
});

/// Entity-type to route-prefix mapping, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<EntityDescriptor>,
}

impl RouteTable {
    /// Build the table, rejecting duplicate names, duplicate prefixes and
    /// malformed prefixes.
    pub fn new(descriptors: &[&EntityDescriptor]) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        let mut routes = HashSet::new();
        let mut entries = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let route = descriptor.route.trim_end_matches('/');
            if !ROUTE_PATTERN.is_match(route) {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.route", descriptor.name),
                    value: descriptor.route.to_string(),
                    reason: "must be a lowercase absolute path".to_string(),
                });
            }
            if !names.insert(descriptor.name.to_lowercase()) {
                return Err(ConfigError::Duplicate {
                    kind: "entity name".to_string(),
                    value: descriptor.name.to_string(),
                });
            }
            if !routes.insert(route) {
                return Err(ConfigError::Duplicate {
                    kind: "route prefix".to_string(),
                    value: descriptor.route.to_string(),
                });
            }
            entries.push(**descriptor);
        }

        Ok(Self { entries })
    }

    /// Find the descriptor whose prefix is the longest match for `path`
    /// on a segment boundary.
    pub fn resolve(&self, path: &str) -> Option<&EntityDescriptor> {
        self.entries
            .iter()
            .filter(|d| {
                let prefix = d.route.trim_end_matches('/');
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|d| d.route.len())
    }

    /// Look up a descriptor by entity-type name (case-insensitive).
    pub fn by_name(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entries
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
