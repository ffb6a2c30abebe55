//! Audit logger.
//!
//! Builds [`AuditRecord`]s from entities and the request context and writes
//! them through the detached executor. A failed write is logged and never
//! reaches the business operation.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use strata_core::{AuditError, Entity, RequestContext, StrataError};
use strata_storage::{AuditOperation, AuditRecord, AuditSink, BULK_ENTITY_ID};

use crate::detached::DetachedExecutor;

/// Writes audit records off the caller's path.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    executor: Arc<DetachedExecutor>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, executor: Arc<DetachedExecutor>) -> Self {
        Self { sink, executor }
    }

    pub fn log_create<E: Entity>(&self, entity: &E, ctx: &RequestContext) {
        self.record(entity, AuditOperation::Create, ctx, |r| {
            r.with_new_value(snapshot(entity))
        });
    }

    pub fn log_update<E: Entity>(&self, old: &E, new: &E, ctx: &RequestContext) {
        self.record(new, AuditOperation::Update, ctx, |r| {
            r.with_old_value(snapshot(old))
                .with_new_value(snapshot(new))
        });
    }

    /// Record a delete. The snapshot is the entity's final state.
    pub fn log_delete<E: Entity>(&self, entity: &E, ctx: &RequestContext) {
        self.record(entity, AuditOperation::Delete, ctx, |r| {
            r.with_old_value(snapshot(entity))
        });
    }

    pub fn log_view<E: Entity>(&self, entity: &E, ctx: &RequestContext) {
        self.record(entity, AuditOperation::View, ctx, |r| {
            r.with_new_value(snapshot(entity))
        });
    }

    /// Record a page view as a count only.
    pub fn log_bulk_view<E: Entity>(&self, count: usize, ctx: &RequestContext) {
        if !E::DESCRIPTOR.audited() {
            return;
        }
        let record = AuditRecord::new(E::entity_name(), BULK_ENTITY_ID, AuditOperation::View, ctx)
            .with_description(format!("Viewed {count} records"));
        self.submit(record);
    }

    fn record<E: Entity>(
        &self,
        entity: &E,
        operation: AuditOperation,
        ctx: &RequestContext,
        fill: impl FnOnce(AuditRecord) -> AuditRecord,
    ) {
        if !E::DESCRIPTOR.audited() {
            return;
        }
        let entity_id = entity.id().map(|id| id.to_string()).unwrap_or_default();
        let record = fill(AuditRecord::new(E::entity_name(), entity_id, operation, ctx));
        self.submit(record);
    }

    fn submit(&self, record: AuditRecord) {
        let sink = Arc::clone(&self.sink);
        self.executor.spawn("audit", async move {
            sink.write(record).await.map_err(StrataError::from)
        });
    }
}

fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Audit snapshot did not serialize");
            None
        }
    }
}

// ============================================================================
// TRACING SINK
// ============================================================================

/// Audit sink that emits each record as a structured event on the `audit`
/// target. Used when no other sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, record: AuditRecord) -> Result<(), AuditError> {
        let old_value = record
            .old_value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AuditError::Serialization {
                reason: e.to_string(),
            })?;
        let new_value = record
            .new_value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AuditError::Serialization {
                reason: e.to_string(),
            })?;

        tracing::info!(
            target: "audit",
            record_id = %record.record_id,
            entity = %record.entity_name,
            entity_id = %record.entity_id,
            operation = %record.operation,
            actor = %record.actor_id,
            tenant = %record.tenant_id,
            ip = %record.ip_address,
            user_agent = %record.user_agent,
            old_value = old_value.as_deref().unwrap_or(""),
            new_value = new_value.as_deref().unwrap_or(""),
            description = record.description.as_deref().unwrap_or(""),
            "audit"
        );
        Ok(())
    }
}
