//! STRATA Engine - Entity Lifecycle Orchestration
//!
//! Composes the permission gate, cache layer, audit logger and hook
//! dispatcher into one uniform pipeline shared by every entity type.
//!
//! # Operations
//!
//! Every [`EntityService`] exposes `find_all`, `find_by_id`, `create`,
//! `update`, `patch`, `delete` and `bulk_create`, plus `exists` and
//! `find_by_id_including_deleted`. Each takes an explicit
//! [`RequestContext`](strata_core::RequestContext) carrying the caller's
//! identity, tenant and permissions.
//!
//! # Concurrency
//!
//! Each operation runs on the caller's task. After-hooks and audit writes
//! additionally run on the engine's [`DetachedExecutor`]; their completion is
//! not ordered relative to the response. Concurrent writers to one row are
//! serialized by the repository's optimistic version check.

pub mod audit;
pub mod cache;
pub mod detached;
pub mod engine;
pub mod hooks;
pub mod permission;
pub mod service;
pub mod telemetry;

pub use audit::{AuditLogger, TracingAuditSink};
pub use cache::{canonical_params, CacheKey, CacheLayer};
pub use detached::DetachedExecutor;
pub use engine::{Engine, EngineBuilder};
pub use hooks::{
    AfterEvent, DispatchMode, EntityHook, HookDispatcher, HookOperation, HookPhase, HookRegistry,
    HookRegistryBuilder,
};
pub use permission::{Action, PermissionGate};
pub use service::EntityService;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
