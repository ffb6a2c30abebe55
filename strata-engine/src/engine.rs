//! Engine assembly.
//!
//! [`Engine`] owns the collaborators shared by every entity service and
//! hands out typed [`EntityService`]s. Build it once at startup:
//!
//! ```no_run
//! # async fn demo() -> strata_core::StrataResult<()> {
//! use strata_engine::Engine;
//!
//! let engine = Engine::builder().build()?;
//! // let invoices = engine.service::<Invoice>(Arc::new(repository));
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use strata_core::{Entity, EngineConfig, EntityDescriptor, RouteTable, StrataResult};
use strata_storage::{AuditSink, CacheBackend, InMemoryCacheBackend, Repository};

use crate::audit::{AuditLogger, TracingAuditSink};
use crate::cache::CacheLayer;
use crate::detached::DetachedExecutor;
use crate::hooks::{HookDispatcher, HookRegistry};
use crate::permission::PermissionGate;
use crate::service::EntityService;

/// Collaborators shared by every entity service.
#[derive(Debug)]
pub(crate) struct EngineCore {
    pub(crate) config: EngineConfig,
    pub(crate) gate: PermissionGate,
    pub(crate) cache: CacheLayer,
    pub(crate) audit: AuditLogger,
    pub(crate) executor: Arc<DetachedExecutor>,
}

/// Entity lifecycle engine.
#[derive(Debug, Clone)]
pub struct Engine {
    core: Arc<EngineCore>,
    hooks: Arc<HookRegistry>,
    routes: Arc<RouteTable>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Service for entity type `E` backed by `repository`.
    pub fn service<E: Entity>(&self, repository: Arc<dyn Repository<E>>) -> EntityService<E> {
        EntityService::new(
            repository,
            Arc::clone(&self.core),
            HookDispatcher::from_registry(&self.hooks),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.core.cache
    }

    /// Static route table of the entity types declared at build time.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Wait for every detached task (after-hooks, audit writes) spawned so
    /// far.
    pub async fn flush(&self) {
        self.core.executor.drain().await;
    }

    /// Drain the detached path before the process exits.
    pub async fn shutdown(&self) {
        let pending = self.core.executor.in_flight();
        tracing::info!(pending, "Engine shutting down");
        self.flush().await;
        tracing::info!("Engine shutdown complete");
    }
}

/// Builder for [`Engine`].
///
/// Defaults: configuration from the environment, an in-memory cache, the
/// tracing audit sink and no hooks.
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    hooks: Option<HookRegistry>,
    descriptors: Vec<EntityDescriptor>,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Declare an entity type in the route table.
    pub fn with_entity<E: Entity>(mut self) -> Self {
        self.descriptors.push(E::DESCRIPTOR);
        self
    }

    /// Validate the configuration and route table, then assemble the engine.
    pub fn build(self) -> StrataResult<Engine> {
        let config = self.config.unwrap_or_else(EngineConfig::from_env);
        config.validate()?;

        let descriptors: Vec<&EntityDescriptor> = self.descriptors.iter().collect();
        let routes = RouteTable::new(&descriptors)?;

        let executor = Arc::new(DetachedExecutor::new(config.detached_concurrency));
        let backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(InMemoryCacheBackend::new()));
        let sink = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(TracingAuditSink));

        let cache = CacheLayer::new(backend, config.cache_enabled, config.default_cache_ttl);
        let audit = AuditLogger::new(sink, Arc::clone(&executor));

        tracing::info!(
            detached_concurrency = config.detached_concurrency,
            cache_enabled = config.cache_enabled,
            entity_types = routes.len(),
            "Engine built"
        );

        Ok(Engine {
            core: Arc::new(EngineCore {
                config,
                gate: PermissionGate::new(),
                cache,
                audit,
                executor,
            }),
            hooks: Arc::new(self.hooks.unwrap_or_default()),
            routes: Arc::new(routes),
        })
    }
}
