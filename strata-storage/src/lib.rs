//! STRATA Storage - Collaborator Contracts and In-Memory Implementations
//!
//! Defines the three external collaborators the lifecycle engine depends on:
//! the persistence contract ([`Repository`]), the named-cache backend
//! ([`CacheBackend`]) and the audit sink ([`AuditSink`]). Each comes with an
//! in-memory implementation for tests and single-process deployments.

pub mod audit;
pub mod cache;
pub mod repository;

pub use audit::{AuditOperation, AuditRecord, AuditSink, InMemoryAuditSink, BULK_ENTITY_ID};
pub use cache::{CacheBackend, CacheStats, InMemoryCacheBackend};
pub use repository::{InMemoryRepository, Repository};
