//! Request-scoped security and tenant context.
//!
//! Every engine call takes a `RequestContext` explicitly. Nothing is read
//! from ambient or thread-local state.

use crate::identity::{ActorId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_ACTOR: &str = "system";
pub const DEFAULT_TENANT: &str = "default";
pub const UNKNOWN: &str = "unknown";

/// Permission that grants every action on every entity type.
pub const WILDCARD_PERMISSION: &str = "*";

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "x-tenant-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";
const USER_AGENT_HEADER: &str = "user-agent";

/// Caller identity, tenant, origin and granted permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub ip_address: String,
    pub user_agent: String,
    pub permissions: HashSet<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            actor_id: DEFAULT_ACTOR.to_string(),
            tenant_id: DEFAULT_TENANT.to_string(),
            ip_address: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
            permissions: HashSet::new(),
        }
    }
}

impl RequestContext {
    /// Context for `actor` with default tenant and no permissions.
    pub fn new(actor_id: impl Into<ActorId>) -> Self {
        Self {
            actor_id: actor_id.into(),
            ..Default::default()
        }
    }

    /// Build a context from transport headers. Header names are matched
    /// case-insensitively; missing headers keep their defaults.
    pub fn from_headers<'a, I>(actor_id: impl Into<ActorId>, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ctx = Self::new(actor_id);
        let mut real_ip = None;

        for (name, value) in headers {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match name.to_ascii_lowercase().as_str() {
                TENANT_HEADER => ctx.tenant_id = value.to_string(),
                FORWARDED_FOR_HEADER => {
                    if let Some(first) = value.split(',').map(str::trim).find(|s| !s.is_empty()) {
                        ctx.ip_address = first.to_string();
                    }
                }
                REAL_IP_HEADER => real_ip = Some(value.to_string()),
                USER_AGENT_HEADER => ctx.user_agent = value.to_string(),
                _ => {}
            }
        }

        if ctx.ip_address == UNKNOWN {
            if let Some(ip) = real_ip {
                ctx.ip_address = ip;
            }
        }
        ctx
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<TenantId>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    /// True when the exact permission or the wildcard is granted.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission) || self.permissions.contains(WILDCARD_PERMISSION)
    }
}
