//! Audit trail records and sinks.
//!
//! Records are created once per tracked operation and never mutated. Sinks
//! are pluggable behind `Arc<dyn AuditSink>`: structured logs, a database
//! table, a remote collector. [`InMemoryAuditSink`] also answers trail
//! queries and is what tests assert against.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use strata_core::{
    new_entity_id, ActorId, AuditError, EntityId, RequestContext, TenantId, Timestamp,
};
use tokio::sync::RwLock;

/// Entity id recorded for bulk views.
pub const BULK_ENTITY_ID: &str = "bulk";

/// Operation tag of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    View,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::View => "VIEW",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub record_id: EntityId,
    pub entity_name: String,
    /// Entity id as text; `"bulk"` for bulk views
    pub entity_id: String,
    pub operation: AuditOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actor_id: ActorId,
    pub ip_address: String,
    pub user_agent: String,
    pub tenant_id: TenantId,
    pub timestamp: Timestamp,
}

impl AuditRecord {
    /// Start a record stamped with the caller's identity and origin.
    pub fn new(
        entity_name: impl Into<String>,
        entity_id: impl Into<String>,
        operation: AuditOperation,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            record_id: new_entity_id(),
            entity_name: entity_name.into(),
            entity_id: entity_id.into(),
            operation,
            old_value: None,
            new_value: None,
            description: None,
            actor_id: ctx.actor_id.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            tenant_id: ctx.tenant_id.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_old_value(mut self, value: Option<Value>) -> Self {
        self.old_value = value;
        self
    }

    pub fn with_new_value(mut self, value: Option<Value>) -> Self {
        self.new_value = value;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ============================================================================
// SINK TRAIT
// ============================================================================

/// Pluggable audit sink.
///
/// The trait is object-safe for use behind `Arc<dyn AuditSink>`. Writes are
/// issued off the caller's path, so an error here is logged and never
/// reaches the business operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a single audit record.
    async fn write(&self, record: AuditRecord) -> Result<(), AuditError>;
}

// ============================================================================
// IN-MEMORY SINK
// ============================================================================

/// Append-only in-memory audit trail.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in write order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }

    /// Trail of one entity, oldest first.
    pub async fn for_entity(&self, entity_name: &str, entity_id: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.entity_name == entity_name && r.entity_id == entity_id)
            .cloned()
            .collect()
    }

    /// Number of records with the given operation tag.
    pub async fn count(&self, operation: AuditOperation) -> usize {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.operation == operation)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.write().await.push(record);
        Ok(())
    }
}
