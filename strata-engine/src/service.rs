//! Entity lifecycle service.
//!
//! [`EntityService`] runs the uniform pipeline for one entity type:
//! permission check, cache lookup, security predicate, repository call,
//! hooks, audit and cache invalidation.
//!
//! # Failure Policy
//!
//! - `AccessDenied` and `NotFound` abort before any side effect.
//! - Validation and before-hook failures abort before persistence.
//! - Audit writes and detached after-hooks never fail the caller.
//! - A failing inline after-hook reverts the committed write through
//!   [`Repository::revert`] and is returned to the caller. No audit record
//!   or detached dispatch is issued for a reverted write.

use chrono::Utc;
use std::sync::Arc;
use strata_core::{
    compile, Condition, Entity, EntityDescriptor, EntityId, FilterParams, Page, PageRequest,
    Predicate, RequestContext, StrataError, StrataResult,
};
use strata_storage::Repository;

use crate::cache::{canonical_params, CacheKey};
use crate::engine::EngineCore;
use crate::hooks::{AfterEvent, DispatchMode, HookDispatcher};
use crate::permission::Action;

const FIND_ALL: &str = "findAll";
const FIND_BY_ID: &str = "findById";

/// Lifecycle operations for entity type `E`.
pub struct EntityService<E: Entity> {
    repository: Arc<dyn Repository<E>>,
    core: Arc<EngineCore>,
    hooks: HookDispatcher<E>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            core: Arc::clone(&self.core),
            hooks: self.hooks.clone(),
        }
    }
}

impl<E: Entity> std::fmt::Debug for EntityService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityService")
            .field("entity", &E::entity_name())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> EntityService<E> {
    pub(crate) fn new(
        repository: Arc<dyn Repository<E>>,
        core: Arc<EngineCore>,
        hooks: HookDispatcher<E>,
    ) -> Self {
        Self {
            repository,
            core,
            hooks,
        }
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        E::DESCRIPTOR
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Page through rows matching `filters`, restricted to the caller's
    /// tenant and excluding soft-deleted rows.
    pub async fn find_all(
        &self,
        filters: &FilterParams,
        page: PageRequest,
        ctx: &RequestContext,
    ) -> StrataResult<Page<E>> {
        let descriptor = E::DESCRIPTOR;
        self.authorize(Action::View, ctx)?;

        let page = self.normalize_page(page);
        let key = CacheKey::new(
            FIND_ALL,
            self.tenant_scope(ctx),
            &canonical_params(filters, &page),
        );
        if let Some(hit) = self.core.cache.get::<Page<E>>(&descriptor, &key).await {
            return Ok(hit);
        }

        let predicate = self.security_predicate(ctx).and(compile::<E>(filters));
        let result = self.repository.find_all(&predicate, &page).await?;

        self.core.audit.log_bulk_view::<E>(result.number_of_elements(), ctx);
        self.core.cache.put(&descriptor, &key, &result).await;
        Ok(result)
    }

    /// Load one visible row. Rows of another tenant or soft-deleted rows
    /// read as `NotFound`.
    pub async fn find_by_id(&self, id: EntityId, ctx: &RequestContext) -> StrataResult<E> {
        let descriptor = E::DESCRIPTOR;
        self.authorize(Action::View, ctx)?;

        let key = CacheKey::new(FIND_BY_ID, self.tenant_scope(ctx), &id.to_string());
        if let Some(hit) = self.core.cache.get::<E>(&descriptor, &key).await {
            return Ok(hit);
        }

        let entity = self.load(id, ctx).await?;
        self.core.audit.log_view(&entity, ctx);
        self.core.cache.put(&descriptor, &key, &entity).await;
        Ok(entity)
    }

    /// Load one row of the caller's tenant even if it is soft-deleted.
    /// Never served from or written to the cache.
    pub async fn find_by_id_including_deleted(
        &self,
        id: EntityId,
        ctx: &RequestContext,
    ) -> StrataResult<E> {
        self.authorize(Action::View, ctx)?;

        let mut predicate = Predicate::by_id(id);
        if E::DESCRIPTOR.multi_tenant() {
            predicate = predicate.with(Condition::TenantEquals(ctx.tenant_id.clone()));
        }
        let entity = self
            .repository
            .find_one(&predicate)
            .await?
            .ok_or_else(|| StrataError::not_found(E::entity_name(), id))?;

        self.core.audit.log_view(&entity, ctx);
        Ok(entity)
    }

    /// Whether a row with `id` is visible to the caller.
    pub async fn exists(&self, id: EntityId, ctx: &RequestContext) -> StrataResult<bool> {
        self.authorize(Action::View, ctx)?;

        if !self.repository.exists_by_id(id).await? {
            return Ok(false);
        }
        let predicate = self.security_predicate(ctx).with(Condition::IdEquals(id));
        Ok(self.repository.find_one(&predicate).await?.is_some())
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub async fn create(&self, entity: E, ctx: &RequestContext) -> StrataResult<E> {
        self.authorize(Action::Create, ctx)?;

        let entity = self.prepare_new(entity, ctx).await?;
        let saved = self.repository.save(entity).await?;
        tracing::info!(
            entity = E::entity_name(),
            id = %display_id(&saved),
            actor = %ctx.actor_id,
            "Entity created"
        );

        self.after_write(AfterEvent::Created(saved.clone()), None, ctx)
            .await?;
        Ok(saved)
    }

    /// Validate `patch`, then merge its present fields onto the stored row.
    pub async fn update(&self, id: EntityId, patch: E::Patch, ctx: &RequestContext) -> StrataResult<E> {
        self.authorize(Action::Edit, ctx)?;
        E::validate_patch(&patch)?;
        self.apply_patch(id, patch, ctx, "update").await
    }

    /// Merge the present fields of `patch` without the update validation step.
    pub async fn patch(&self, id: EntityId, patch: E::Patch, ctx: &RequestContext) -> StrataResult<E> {
        self.authorize(Action::Edit, ctx)?;
        self.apply_patch(id, patch, ctx, "patch").await
    }

    /// Soft-delete the row, or remove it when the type has no soft delete.
    pub async fn delete(&self, id: EntityId, ctx: &RequestContext) -> StrataResult<()> {
        self.authorize(Action::Delete, ctx)?;

        let existing = self.load(id, ctx).await?;
        let previous = existing.clone();
        let mut entity = self.hooks.before_delete(existing, ctx).await?;

        let removed = if E::DESCRIPTOR.soft_delete() {
            entity.meta_mut().mark_deleted(&ctx.actor_id, Utc::now());
            self.repository.save(entity).await?
        } else {
            self.repository.delete(&entity).await?;
            entity
        };
        tracing::info!(
            entity = E::entity_name(),
            id = %id,
            actor = %ctx.actor_id,
            soft = E::DESCRIPTOR.soft_delete(),
            "Entity deleted"
        );

        self.after_write(AfterEvent::Deleted(removed), Some(previous), ctx)
            .await
    }

    /// Create every entity in one repository batch. Nothing is kept if any
    /// entity fails validation, a before-hook or an inline after-hook.
    pub async fn bulk_create(&self, entities: Vec<E>, ctx: &RequestContext) -> StrataResult<Vec<E>> {
        self.authorize(Action::Create, ctx)?;
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let mut prepared = Vec::with_capacity(entities.len());
        for entity in entities {
            prepared.push(self.prepare_new(entity, ctx).await?);
        }
        let saved = self.repository.save_all(prepared).await?;
        tracing::info!(
            entity = E::entity_name(),
            count = saved.len(),
            actor = %ctx.actor_id,
            "Entities created"
        );

        for entity in &saved {
            let event = AfterEvent::Created(entity.clone());
            if let Err(e) = self.hooks.dispatch_after(&event, ctx, DispatchMode::Inline).await {
                let writes = saved.iter().map(|committed| (committed, None)).collect();
                self.revert(writes, &e).await;
                return Err(e);
            }
        }

        for entity in &saved {
            self.core.audit.log_create(entity, ctx);
            self.hooks
                .spawn_after(AfterEvent::Created(entity.clone()), ctx.clone(), &self.core.executor);
        }
        self.core.cache.clear(&E::DESCRIPTOR).await;
        Ok(saved)
    }

    // ========================================================================
    // PIPELINE STEPS
    // ========================================================================

    fn authorize(&self, action: Action, ctx: &RequestContext) -> StrataResult<()> {
        self.core.gate.check(&E::DESCRIPTOR, action, ctx)
    }

    fn tenant_scope<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        E::DESCRIPTOR
            .multi_tenant()
            .then_some(ctx.tenant_id.as_str())
    }

    /// Mandatory conditions for every standard read.
    fn security_predicate(&self, ctx: &RequestContext) -> Predicate {
        let mut predicate = Predicate::all();
        if E::DESCRIPTOR.soft_delete() {
            predicate = predicate.with(Condition::NotDeleted);
        }
        if E::DESCRIPTOR.multi_tenant() {
            predicate = predicate.with(Condition::TenantEquals(ctx.tenant_id.clone()));
        }
        predicate
    }

    async fn load(&self, id: EntityId, ctx: &RequestContext) -> StrataResult<E> {
        let predicate = self.security_predicate(ctx).with(Condition::IdEquals(id));
        self.repository
            .find_one(&predicate)
            .await?
            .ok_or_else(|| StrataError::not_found(E::entity_name(), id))
    }

    fn normalize_page(&self, mut page: PageRequest) -> PageRequest {
        if page.size == 0 {
            page.size = self.core.config.default_page_size;
        }
        let drop_sort = page.sort.as_ref().is_some_and(|sort| {
            E::resolve_kind(&sort.field).is_none() || !E::DESCRIPTOR.is_sortable(&sort.field)
        });
        if drop_sort {
            tracing::debug!(entity = E::entity_name(), sort = ?page.sort, "Dropping unsortable sort field");
            page.sort = None;
        }
        page.clamped(self.core.config.max_page_size)
    }

    /// Stamp identity, tenant and audit metadata, then run the
    /// pre-validate hooks, validation and before-create hooks.
    async fn prepare_new(&self, mut entity: E, ctx: &RequestContext) -> StrataResult<E> {
        let now = Utc::now();
        let meta = entity.meta_mut();
        meta.id = None;
        meta.version = 0;
        meta.deleted = false;
        meta.deleted_at = None;
        meta.deleted_by = None;
        meta.mark_created(&ctx.actor_id, now);
        if E::DESCRIPTOR.multi_tenant() {
            meta.tenant_id = Some(ctx.tenant_id.clone());
        }

        let entity = self
            .hooks
            .pre_validate(entity, ctx)
            .await
            .map_err(StrataError::into_validation)?;
        entity.validate()?;
        self.hooks.before_create(entity, ctx).await
    }

    async fn apply_patch(
        &self,
        id: EntityId,
        patch: E::Patch,
        ctx: &RequestContext,
        operation: &'static str,
    ) -> StrataResult<E> {
        let existing = self.load(id, ctx).await?;
        let old = existing.clone();

        let mut entity = self.hooks.before_update(existing, &patch, ctx).await?;
        entity.merge(&patch);
        entity.meta_mut().mark_modified(&ctx.actor_id, Utc::now());

        let saved = self.repository.save(entity).await?;
        tracing::info!(
            entity = E::entity_name(),
            id = %id,
            version = saved.meta().version,
            actor = %ctx.actor_id,
            operation,
            "Entity updated"
        );

        let previous = old.clone();
        self.after_write(
            AfterEvent::Updated {
                old,
                new: saved.clone(),
            },
            Some(previous),
            ctx,
        )
        .await?;
        Ok(saved)
    }

    /// Inline after-hooks, then audit, detached after-hooks and cache clear.
    /// A failing inline after-hook reverts the write to `previous` instead.
    async fn after_write(
        &self,
        event: AfterEvent<E>,
        previous: Option<E>,
        ctx: &RequestContext,
    ) -> StrataResult<()> {
        if let Err(e) = self
            .hooks
            .dispatch_after(&event, ctx, DispatchMode::Inline)
            .await
        {
            self.revert(vec![(event.entity(), previous)], &e).await;
            return Err(e);
        }

        match &event {
            AfterEvent::Created(entity) => self.core.audit.log_create(entity, ctx),
            AfterEvent::Updated { old, new } => self.core.audit.log_update(old, new, ctx),
            AfterEvent::Deleted(entity) => self.core.audit.log_delete(entity, ctx),
        }
        self.hooks.spawn_after(event, ctx.clone(), &self.core.executor);
        self.core.cache.clear(&E::DESCRIPTOR).await;
        Ok(())
    }

    /// Undo committed writes after an inline after-hook failed.
    async fn revert(&self, writes: Vec<(&E, Option<E>)>, cause: &StrataError) {
        tracing::warn!(
            entity = E::entity_name(),
            writes = writes.len(),
            error = %cause,
            "Inline after-hook failed, reverting"
        );
        for (committed, previous) in writes {
            if let Err(e) = self.repository.revert(committed, previous).await {
                tracing::error!(
                    entity = E::entity_name(),
                    id = %display_id(committed),
                    error = %e,
                    "Revert failed, committed write remains"
                );
            }
        }
        // Readers may have cached the reverted state.
        self.core.cache.clear(&E::DESCRIPTOR).await;
    }
}

fn display_id<E: Entity>(entity: &E) -> String {
    entity.id().map(|id| id.to_string()).unwrap_or_default()
}
