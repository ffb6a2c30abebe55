//! Composable query predicates.
//!
//! A [`Predicate`] is an ordered list of conditions joined by logical AND.
//! The engine builds one per request from the caller's filters plus the
//! mandatory security conditions and hands it to the repository, which may
//! translate it or evaluate it in memory with [`Predicate::matches`].

use crate::entity::Entity;
use crate::filter::FilterClause;
use crate::identity::{EntityId, TenantId};

/// One AND-ed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Caller-supplied field filter
    Field(FilterClause),
    /// Row identity
    IdEquals(EntityId),
    /// Excludes soft-deleted rows
    NotDeleted,
    /// Restricts rows to one tenant
    TenantEquals(TenantId),
}

impl Condition {
    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        match self {
            Condition::Field(clause) => clause.matches(entity.resolve_field(&clause.field).as_ref()),
            Condition::IdEquals(id) => entity.meta().id == Some(*id),
            Condition::NotDeleted => !entity.meta().deleted,
            Condition::TenantEquals(tenant) => entity.meta().tenant_id.as_ref() == Some(tenant),
        }
    }
}

/// Conjunction of conditions. The empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Predicate matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self::all().with(Condition::IdEquals(id))
    }

    pub fn from_clauses(clauses: Vec<FilterClause>) -> Self {
        Self {
            conditions: clauses.into_iter().map(Condition::Field).collect(),
        }
    }

    /// Append a condition.
    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Logical AND of two predicates.
    pub fn and(mut self, other: Predicate) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn contains(&self, condition: &Condition) -> bool {
        self.conditions.contains(condition)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches<E: Entity>(&self, entity: &E) -> bool {
        self.conditions.iter().all(|c| c.matches(entity))
    }
}
