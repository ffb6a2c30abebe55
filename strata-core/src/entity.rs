//! The generic entity contract.
//!
//! Every business record type managed by the engine implements [`Entity`].
//! The trait replaces runtime introspection with explicit, per-type code:
//! field access by name for filtering and sorting, a shallow patch merge,
//! and `Clone` as the snapshot strategy.

use crate::descriptor::EntityDescriptor;
use crate::error::ValidationError;
use crate::identity::{ActorId, EntityId, TenantId, Timestamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// FIELD VALUES
// ============================================================================

/// Kind of a named field, used to pick the default filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
    Uuid,
}

impl FieldKind {
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldKind::Text)
    }
}

/// A field value read from an entity by name.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(Timestamp),
    Uuid(Uuid),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Uuid(_) => FieldKind::Uuid,
        }
    }

    /// Total order between two values of compatible kinds. Integers and
    /// floats compare numerically with each other.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(v: Timestamp) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

// ============================================================================
// ENTITY METADATA
// ============================================================================

/// Identity, versioning, soft-delete, audit and tenant metadata shared by
/// every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Assigned by the repository on first save
    pub id: Option<EntityId>,
    /// Optimistic lock counter, 0 after the first insert
    pub version: i64,
    pub deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub deleted_by: Option<ActorId>,
    pub created_by: Option<ActorId>,
    pub created_at: Option<Timestamp>,
    pub modified_by: Option<ActorId>,
    pub modified_at: Option<Timestamp>,
    /// Owning tenant (branch) for multi-tenant entity types
    pub tenant_id: Option<TenantId>,
}

impl EntityMeta {
    /// Kind of a metadata field, or `None` if `name` is not one.
    pub fn kind_of(name: &str) -> Option<FieldKind> {
        match name {
            "id" => Some(FieldKind::Uuid),
            "version" => Some(FieldKind::Integer),
            "deleted" | "isDeleted" => Some(FieldKind::Bool),
            "deletedAt" | "deleted_at" | "createdAt" | "created_at" | "modifiedAt"
            | "modified_at" | "lastModifiedAt" => Some(FieldKind::Timestamp),
            "deletedBy" | "deleted_by" | "createdBy" | "created_by" | "modifiedBy"
            | "modified_by" | "lastModifiedBy" | "tenantId" | "tenant_id" | "branchId" => {
                Some(FieldKind::Text)
            }
            _ => None,
        }
    }

    /// Value of a metadata field. The outer `None` means `name` is not a
    /// metadata field, the inner one means the value is unset.
    pub fn value_of(&self, name: &str) -> Option<Option<FieldValue>> {
        let value = match name {
            "id" => self.id.map(FieldValue::Uuid),
            "version" => Some(FieldValue::Integer(self.version)),
            "deleted" | "isDeleted" => Some(FieldValue::Bool(self.deleted)),
            "deletedAt" | "deleted_at" => self.deleted_at.map(FieldValue::Timestamp),
            "createdAt" | "created_at" => self.created_at.map(FieldValue::Timestamp),
            "modifiedAt" | "modified_at" | "lastModifiedAt" => {
                self.modified_at.map(FieldValue::Timestamp)
            }
            "deletedBy" | "deleted_by" => self.deleted_by.clone().map(FieldValue::Text),
            "createdBy" | "created_by" => self.created_by.clone().map(FieldValue::Text),
            "modifiedBy" | "modified_by" | "lastModifiedBy" => {
                self.modified_by.clone().map(FieldValue::Text)
            }
            "tenantId" | "tenant_id" | "branchId" => self.tenant_id.clone().map(FieldValue::Text),
            _ => return None,
        };
        Some(value)
    }

    /// Stamp creation metadata.
    pub fn mark_created(&mut self, actor: &str, at: Timestamp) {
        self.created_by = Some(actor.to_string());
        self.created_at = Some(at);
        self.mark_modified(actor, at);
    }

    pub fn mark_modified(&mut self, actor: &str, at: Timestamp) {
        self.modified_by = Some(actor.to_string());
        self.modified_at = Some(at);
    }

    pub fn mark_deleted(&mut self, actor: &str, at: Timestamp) {
        self.deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = Some(actor.to_string());
        self.mark_modified(actor, at);
    }
}

// ============================================================================
// ENTITY TRAIT
// ============================================================================

/// Contract every engine-managed record type implements.
///
/// # Implementation Requirements
///
/// - `field` and `field_kind` must agree: every name with a kind must be
///   readable, returning `None` only for unset values
/// - `merge` is shallow: a patch field overwrites only when it is `Some`
/// - `DESCRIPTOR.name` must be unique across the process
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Partial payload for update and patch.
    type Patch: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Static description of this entity type.
    const DESCRIPTOR: EntityDescriptor;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Read a business field by name.
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Kind of a business field, `None` for unknown names.
    fn field_kind(name: &str) -> Option<FieldKind>;

    /// Copy every present field of `patch` onto `self`.
    fn merge(&mut self, patch: &Self::Patch);

    /// Entity-level constraint checks.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Constraint checks applied to an update payload before merging.
    fn validate_patch(_patch: &Self::Patch) -> Result<(), ValidationError> {
        Ok(())
    }

    fn entity_name() -> &'static str {
        Self::DESCRIPTOR.name
    }

    fn id(&self) -> Option<EntityId> {
        self.meta().id
    }

    /// Read a metadata or business field by name.
    fn resolve_field(&self, name: &str) -> Option<FieldValue> {
        match self.meta().value_of(name) {
            Some(value) => value,
            None => self.field(name),
        }
    }

    /// Kind of a metadata or business field.
    fn resolve_kind(name: &str) -> Option<FieldKind> {
        EntityMeta::kind_of(name).or_else(|| Self::field_kind(name))
    }
}

/// Overwrite `target` when the patch carries a value.
pub fn merge_present<T: Clone>(target: &mut T, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *target = value.clone();
    }
}

/// Overwrite an optional `target` when the patch carries a value.
pub fn merge_present_opt<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        target.clone_from(incoming);
    }
}
