//! Permission gate.
//!
//! Maps (entity type, action) to a permission key of the form
//! `lower(entity):action` and checks it against the caller's granted set.
//! The wildcard `*` grants everything.

use serde::{Deserialize, Serialize};
use std::fmt;
use strata_core::{EntityDescriptor, RequestContext, StrataError, StrataResult};

/// Action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless permission check run before any cache or repository access.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionGate;

impl PermissionGate {
    pub fn new() -> Self {
        Self
    }

    /// Permission key for an action on an entity type.
    pub fn permission_key(descriptor: &EntityDescriptor, action: Action) -> String {
        descriptor.permission_key(action.as_str())
    }

    /// Fail with `AccessDenied` unless the caller holds the permission.
    pub fn check(
        &self,
        descriptor: &EntityDescriptor,
        action: Action,
        ctx: &RequestContext,
    ) -> StrataResult<()> {
        let permission = Self::permission_key(descriptor, action);
        if ctx.has_permission(&permission) {
            return Ok(());
        }

        tracing::warn!(
            actor = %ctx.actor_id,
            tenant = %ctx.tenant_id,
            permission = %permission,
            "Access denied"
        );
        Err(StrataError::AccessDenied { permission })
    }
}
