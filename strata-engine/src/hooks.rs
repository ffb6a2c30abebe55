//! Lifecycle hooks.
//!
//! Hooks are registered in code at startup through [`HookRegistryBuilder`]
//! and frozen into an immutable [`HookRegistry`]. Each entity service gets a
//! [`HookDispatcher`] holding that type's hooks in registration order.
//!
//! # Phases
//!
//! - `PreValidate` and `PreOperation` hooks return a (possibly new) entity
//!   that feeds the next hook in the chain.
//! - `PostOperation` hooks are side-effect only. The engine dispatches each
//!   after-event twice: once inline and once on the detached executor. The
//!   [`DispatchMode`] argument tells the hook which call it is receiving;
//!   hooks acting on both must be idempotent.
//! - `AfterCommit` is reserved and never dispatched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strata_core::{Entity, RequestContext, StrataResult};

use crate::detached::DetachedExecutor;

// ============================================================================
// PHASES
// ============================================================================

/// Named point in the entity lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookPhase {
    PreValidate,
    PreOperation,
    PostOperation,
    /// Reserved, never dispatched
    AfterCommit,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreValidate => "PRE_VALIDATE",
            Self::PreOperation => "PRE_OPERATION",
            Self::PostOperation => "POST_OPERATION",
            Self::AfterCommit => "AFTER_COMMIT",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation a before/after hook is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookOperation {
    Create,
    Update,
    Delete,
}

impl HookOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for HookOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two after-phase dispatches a hook is receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the caller's request path
    Inline,
    /// On the detached executor, unordered relative to the response
    Detached,
}

// ============================================================================
// HOOK TRAIT
// ============================================================================

/// Lifecycle callbacks for one entity type. Every method defaults to a
/// pass-through, so implementors override only the phases they need.
///
/// A failing before-hook aborts the operation before anything is persisted.
/// A failing inline after-hook fails the request after the write has been
/// committed. A failing detached after-hook is logged and dropped.
#[async_trait]
pub trait EntityHook<E: Entity>: Send + Sync {
    /// Name used in logs and hook errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn pre_validate(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        Ok(entity)
    }

    async fn before_create(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        Ok(entity)
    }

    /// Runs before `patch` is merged onto `existing`.
    async fn before_update(
        &self,
        existing: E,
        _patch: &E::Patch,
        _ctx: &RequestContext,
    ) -> StrataResult<E> {
        Ok(existing)
    }

    async fn before_delete(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        Ok(entity)
    }

    async fn after_create(
        &self,
        _entity: &E,
        _ctx: &RequestContext,
        _mode: DispatchMode,
    ) -> StrataResult<()> {
        Ok(())
    }

    async fn after_update(
        &self,
        _old: &E,
        _new: &E,
        _ctx: &RequestContext,
        _mode: DispatchMode,
    ) -> StrataResult<()> {
        Ok(())
    }

    async fn after_delete(
        &self,
        _entity: &E,
        _ctx: &RequestContext,
        _mode: DispatchMode,
    ) -> StrataResult<()> {
        Ok(())
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

type HookList<E> = Vec<Arc<dyn EntityHook<E>>>;

/// Collects hooks at startup.
#[derive(Default)]
pub struct HookRegistryBuilder {
    hooks: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
    counts: HashMap<TypeId, usize>,
}

impl HookRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook for `E`. Hooks run in registration order.
    pub fn register<E, H>(self, hook: H) -> Self
    where
        E: Entity,
        H: EntityHook<E> + 'static,
    {
        self.register_shared::<E>(Arc::new(hook))
    }

    /// Append a hook the caller keeps a handle to.
    pub fn register_shared<E: Entity>(mut self, hook: Arc<dyn EntityHook<E>>) -> Self {
        let type_id = TypeId::of::<E>();
        self.names.insert(type_id, E::entity_name());
        *self.counts.entry(type_id).or_default() += 1;
        let slot = self
            .hooks
            .entry(type_id)
            .or_insert_with(|| Box::new(HookList::<E>::new()));
        if let Some(list) = slot.downcast_mut::<HookList<E>>() {
            list.push(hook);
        }
        self
    }

    /// Freeze the table.
    pub fn build(self) -> HookRegistry {
        for (type_id, name) in &self.names {
            let count = self.counts.get(type_id).copied().unwrap_or(0);
            tracing::debug!(entity = %name, registered = count, "Hooks registered");
        }
        HookRegistry {
            hooks: self.hooks,
            names: self.names,
        }
    }
}

/// Immutable per-entity-type hook table.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: HashMap<TypeId, &'static str>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("entity_types", &self.names.values().collect::<Vec<_>>())
            .finish()
    }
}

impl HookRegistry {
    /// Hooks registered for `E`, in registration order.
    pub fn hooks_for<E: Entity>(&self) -> HookList<E> {
        self.hooks
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<HookList<E>>())
            .cloned()
            .unwrap_or_default()
    }

    /// Names of every entity type with at least one hook.
    pub fn entity_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.names.values().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Completed mutation handed to after-hooks.
#[derive(Debug, Clone)]
pub enum AfterEvent<E> {
    Created(E),
    Updated { old: E, new: E },
    Deleted(E),
}

impl<E> AfterEvent<E> {
    pub fn operation(&self) -> HookOperation {
        match self {
            Self::Created(_) => HookOperation::Create,
            Self::Updated { .. } => HookOperation::Update,
            Self::Deleted(_) => HookOperation::Delete,
        }
    }

    /// The entity as the write left it.
    pub fn entity(&self) -> &E {
        match self {
            Self::Created(entity) | Self::Deleted(entity) => entity,
            Self::Updated { new, .. } => new,
        }
    }
}

/// Runs one entity type's hooks.
pub struct HookDispatcher<E: Entity> {
    hooks: Arc<[Arc<dyn EntityHook<E>>]>,
}

impl<E: Entity> Clone for HookDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<E: Entity> fmt::Debug for HookDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("entity", &E::entity_name())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl<E: Entity> HookDispatcher<E> {
    pub fn new(hooks: HookList<E>) -> Self {
        Self {
            hooks: hooks.into(),
        }
    }

    pub fn from_registry(registry: &HookRegistry) -> Self {
        Self::new(registry.hooks_for::<E>())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn trace(&self, phase: HookPhase, operation: Option<HookOperation>, hook: &dyn EntityHook<E>) {
        tracing::trace!(
            entity = E::entity_name(),
            phase = %phase,
            operation = operation.map(|op| op.as_str()).unwrap_or(""),
            hook = hook.name(),
            "Dispatching hook"
        );
    }

    pub async fn pre_validate(&self, mut entity: E, ctx: &RequestContext) -> StrataResult<E> {
        for hook in self.hooks.iter() {
            self.trace(HookPhase::PreValidate, None, &**hook);
            entity = hook.pre_validate(entity, ctx).await?;
        }
        Ok(entity)
    }

    pub async fn before_create(&self, mut entity: E, ctx: &RequestContext) -> StrataResult<E> {
        for hook in self.hooks.iter() {
            self.trace(HookPhase::PreOperation, Some(HookOperation::Create), &**hook);
            entity = hook.before_create(entity, ctx).await?;
        }
        Ok(entity)
    }

    pub async fn before_update(
        &self,
        mut existing: E,
        patch: &E::Patch,
        ctx: &RequestContext,
    ) -> StrataResult<E> {
        for hook in self.hooks.iter() {
            self.trace(HookPhase::PreOperation, Some(HookOperation::Update), &**hook);
            existing = hook.before_update(existing, patch, ctx).await?;
        }
        Ok(existing)
    }

    pub async fn before_delete(&self, mut entity: E, ctx: &RequestContext) -> StrataResult<E> {
        for hook in self.hooks.iter() {
            self.trace(HookPhase::PreOperation, Some(HookOperation::Delete), &**hook);
            entity = hook.before_delete(entity, ctx).await?;
        }
        Ok(entity)
    }

    /// Run every after-hook for `event` in order. Stops at the first error.
    pub async fn dispatch_after(
        &self,
        event: &AfterEvent<E>,
        ctx: &RequestContext,
        mode: DispatchMode,
    ) -> StrataResult<()> {
        dispatch_after_all(&self.hooks, event, ctx, mode).await
    }

    /// Run the after-hooks for `event` on the detached executor.
    pub fn spawn_after(
        &self,
        event: AfterEvent<E>,
        ctx: RequestContext,
        executor: &DetachedExecutor,
    ) {
        if self.hooks.is_empty() {
            return;
        }
        let hooks = Arc::clone(&self.hooks);
        executor.spawn("after_hooks", async move {
            dispatch_after_all(&hooks, &event, &ctx, DispatchMode::Detached).await
        });
    }
}

async fn dispatch_after_all<E: Entity>(
    hooks: &[Arc<dyn EntityHook<E>>],
    event: &AfterEvent<E>,
    ctx: &RequestContext,
    mode: DispatchMode,
) -> StrataResult<()> {
    for hook in hooks {
        tracing::trace!(
            entity = E::entity_name(),
            phase = %HookPhase::PostOperation,
            operation = %event.operation(),
            hook = hook.name(),
            ?mode,
            "Dispatching hook"
        );
        match event {
            AfterEvent::Created(entity) => hook.after_create(entity, ctx, mode).await?,
            AfterEvent::Updated { old, new } => hook.after_update(old, new, ctx, mode).await?,
            AfterEvent::Deleted(entity) => hook.after_delete(entity, ctx, mode).await?,
        }
    }
    Ok(())
}
