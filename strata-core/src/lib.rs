//! STRATA Core - Entity Contract and Query Types
//!
//! Data types shared by every STRATA crate: identity, the `Entity` trait,
//! descriptors and the static route table, the filter compiler, predicates,
//! paging, the request context, configuration and the error taxonomy.
//! No I/O happens here.

pub mod config;
pub mod context;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod filter;
pub mod identity;
pub mod page;
pub mod predicate;

pub use config::EngineConfig;
pub use context::{RequestContext, WILDCARD_PERMISSION};
pub use descriptor::{Capabilities, EntityDescriptor, RouteTable, DEFAULT_CACHE_TTL_SECS};
pub use entity::{merge_present, merge_present_opt, Entity, EntityMeta, FieldKind, FieldValue};
pub use error::{
    AuditError, CacheError, ConfigError, ErrorCode, ErrorResponse, FieldViolation, StorageError,
    StrataError, StrataResult, ValidationError,
};
pub use filter::{
    compile, compile_clauses, FilterClause, FilterOperator, FilterParams, FilterValue, Operand,
    TypedValue,
};
pub use identity::{new_entity_id, ActorId, EntityId, TenantId, Timestamp};
pub use page::{Page, PageRequest, Sort, SortDirection, DEFAULT_PAGE_SIZE};
pub use predicate::{Condition, Predicate};
