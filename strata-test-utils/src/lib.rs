//! STRATA Test Utilities
//!
//! Shared test infrastructure for the STRATA workspace:
//! - Sample entity types (`Invoice`, `Customer`)
//! - Counting and failing collaborators
//! - A recording lifecycle hook
//! - Proptest generators, fixtures and assertions

pub use strata_core::{
    Capabilities, Entity, EntityDescriptor, EntityId, EntityMeta, FieldKind, FieldValue,
    FilterParams, Page, PageRequest, RequestContext, StrataError, StrataResult, Timestamp,
    ValidationError,
};
pub use strata_engine::{Engine, EntityService, HookRegistry};
pub use strata_storage::{InMemoryAuditSink, InMemoryCacheBackend, InMemoryRepository};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strata_core::{merge_present, merge_present_opt, AuditError, CacheError, StorageError};
use strata_core::{EngineConfig, Predicate};
use strata_engine::{DispatchMode, EntityHook};
use strata_storage::{AuditRecord, AuditSink, CacheBackend, CacheStats, Repository};

// ============================================================================
// SAMPLE ENTITIES
// ============================================================================

/// Multi-tenant, soft-deleted, audited, cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(default)]
    pub meta: EntityMeta,
    pub number: String,
    pub customer_name: String,
    pub amount_cents: i64,
    pub status: String,
    #[serde(default)]
    pub issued_at: Option<Timestamp>,
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePatch {
    pub number: Option<String>,
    pub customer_name: Option<String>,
    pub amount_cents: Option<i64>,
    pub status: Option<String>,
    pub issued_at: Option<Timestamp>,
    pub paid: Option<bool>,
}

impl Invoice {
    pub fn new(number: impl Into<String>, customer_name: impl Into<String>, amount_cents: i64) -> Self {
        Self {
            meta: EntityMeta::default(),
            number: number.into(),
            customer_name: customer_name.into(),
            amount_cents,
            status: "draft".to_string(),
            issued_at: None,
            paid: false,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

impl Entity for Invoice {
    type Patch = InvoicePatch;

    const DESCRIPTOR: EntityDescriptor = EntityDescriptor::new("Invoice", "/api/invoices")
        .with_capabilities(Capabilities::DEFAULT.union(Capabilities::MULTI_TENANT));

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "number" => Some(FieldValue::from(self.number.as_str())),
            "customerName" | "customer_name" => Some(FieldValue::from(self.customer_name.as_str())),
            "amountCents" | "amount_cents" => Some(FieldValue::Integer(self.amount_cents)),
            "status" => Some(FieldValue::from(self.status.as_str())),
            "issuedAt" | "issued_at" => self.issued_at.map(FieldValue::Timestamp),
            "paid" => Some(FieldValue::Bool(self.paid)),
            _ => None,
        }
    }

    fn field_kind(name: &str) -> Option<FieldKind> {
        match name {
            "number" | "customerName" | "customer_name" | "status" => Some(FieldKind::Text),
            "amountCents" | "amount_cents" => Some(FieldKind::Integer),
            "issuedAt" | "issued_at" => Some(FieldKind::Timestamp),
            "paid" => Some(FieldKind::Bool),
            _ => None,
        }
    }

    fn merge(&mut self, patch: &InvoicePatch) {
        merge_present(&mut self.number, &patch.number);
        merge_present(&mut self.customer_name, &patch.customer_name);
        merge_present(&mut self.amount_cents, &patch.amount_cents);
        merge_present(&mut self.status, &patch.status);
        merge_present_opt(&mut self.issued_at, &patch.issued_at);
        merge_present(&mut self.paid, &patch.paid);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require(!self.number.trim().is_empty(), "number", "must not be blank");
        errors.require(self.amount_cents >= 0, "amountCents", "must not be negative");
        errors.into_result()
    }

    fn validate_patch(patch: &InvoicePatch) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        if let Some(number) = &patch.number {
            errors.require(!number.trim().is_empty(), "number", "must not be blank");
        }
        if let Some(amount) = patch.amount_cents {
            errors.require(amount >= 0, "amountCents", "must not be negative");
        }
        errors.into_result()
    }
}

/// Single-tenant, hard-deleted, audited, cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub meta: EntityMeta,
    pub name: String,
    pub email: String,
    pub age: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>, age: i64) -> Self {
        Self {
            meta: EntityMeta::default(),
            name: name.into(),
            email: email.into(),
            age,
        }
    }
}

impl Entity for Customer {
    type Patch = CustomerPatch;

    const DESCRIPTOR: EntityDescriptor = EntityDescriptor::new("Customer", "/api/customers")
        .with_capabilities(Capabilities::AUDIT.union(Capabilities::CACHE))
        .with_sortable_fields(&["name", "age", "createdAt"]);

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => Some(FieldValue::from(self.name.as_str())),
            "email" => Some(FieldValue::from(self.email.as_str())),
            "age" => Some(FieldValue::Integer(self.age)),
            _ => None,
        }
    }

    fn field_kind(name: &str) -> Option<FieldKind> {
        match name {
            "name" | "email" => Some(FieldKind::Text),
            "age" => Some(FieldKind::Integer),
            _ => None,
        }
    }

    fn merge(&mut self, patch: &CustomerPatch) {
        merge_present(&mut self.name, &patch.name);
        merge_present(&mut self.email, &patch.email);
        merge_present(&mut self.age, &patch.age);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        errors.require(!self.name.trim().is_empty(), "name", "must not be blank");
        errors.require(self.email.contains('@'), "email", "must be an email address");
        errors.into_result()
    }

    fn validate_patch(patch: &CustomerPatch) -> Result<(), ValidationError> {
        match &patch.email {
            Some(email) if !email.contains('@') => {
                Err(ValidationError::field("email", "must be an email address"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// COUNTING REPOSITORY
// ============================================================================

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub find_all: AtomicUsize,
    pub find_one: AtomicUsize,
    pub save: AtomicUsize,
    pub save_all: AtomicUsize,
    pub delete: AtomicUsize,
    pub exists_by_id: AtomicUsize,
    pub revert: AtomicUsize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        [
            &self.find_all,
            &self.find_one,
            &self.save,
            &self.save_all,
            &self.delete,
            &self.exists_by_id,
            &self.revert,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn writes(&self) -> usize {
        self.save.load(Ordering::SeqCst)
            + self.save_all.load(Ordering::SeqCst)
            + self.delete.load(Ordering::SeqCst)
            + self.revert.load(Ordering::SeqCst)
    }
}

/// In-memory repository that counts every call.
pub struct CountingRepository<E: Entity> {
    inner: InMemoryRepository<E>,
    counts: Arc<CallCounts>,
}

impl<E: Entity> Clone for CountingRepository<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            counts: Arc::clone(&self.counts),
        }
    }
}

impl<E: Entity> Default for CountingRepository<E> {
    fn default() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            counts: Arc::new(CallCounts::default()),
        }
    }
}

impl<E: Entity> CountingRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uncounted access to the stored rows.
    pub fn inner(&self) -> &InMemoryRepository<E> {
        &self.inner
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for CountingRepository<E> {
    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> Result<Page<E>, StorageError> {
        self.counts.find_all.fetch_add(1, Ordering::SeqCst);
        self.inner.find_all(predicate, page).await
    }

    async fn find_one(&self, predicate: &Predicate) -> Result<Option<E>, StorageError> {
        self.counts.find_one.fetch_add(1, Ordering::SeqCst);
        self.inner.find_one(predicate).await
    }

    async fn save(&self, entity: E) -> Result<E, StorageError> {
        self.counts.save.fetch_add(1, Ordering::SeqCst);
        self.inner.save(entity).await
    }

    async fn save_all(&self, entities: Vec<E>) -> Result<Vec<E>, StorageError> {
        self.counts.save_all.fetch_add(1, Ordering::SeqCst);
        self.inner.save_all(entities).await
    }

    async fn delete(&self, entity: &E) -> Result<(), StorageError> {
        self.counts.delete.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(entity).await
    }

    async fn exists_by_id(&self, id: EntityId) -> Result<bool, StorageError> {
        self.counts.exists_by_id.fetch_add(1, Ordering::SeqCst);
        self.inner.exists_by_id(id).await
    }

    async fn revert(&self, committed: &E, previous: Option<E>) -> Result<(), StorageError> {
        self.counts.revert.fetch_add(1, Ordering::SeqCst);
        self.inner.revert(committed, previous).await
    }
}

// ============================================================================
// FAILING COLLABORATORS
// ============================================================================

/// Cache backend whose every call fails.
#[derive(Debug, Default)]
pub struct FailingCacheBackend {
    pub calls: AtomicUsize,
}

impl FailingCacheBackend {
    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable {
            reason: "cache offline".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _cache: &str, _key: &str) -> Result<Option<Value>, CacheError> {
        self.fail()
    }

    async fn put(
        &self,
        _cache: &str,
        _key: &str,
        _value: Value,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.fail()
    }

    async fn evict(&self, _cache: &str, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }

    async fn clear(&self, _cache: &str) -> Result<u64, CacheError> {
        self.fail()
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.fail()
    }
}

/// Audit sink whose every write fails.
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn write(&self, _record: AuditRecord) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::WriteFailed {
            reason: "audit store offline".to_string(),
        })
    }
}

// ============================================================================
// RECORDING HOOK
// ============================================================================

/// Hook that records every call as `"<phase>"` or `"<phase>:<mode>"`.
///
/// It can be told to fail one phase and to wait on a barrier in
/// `before_update`, which lines up concurrent updates on the same version.
#[derive(Debug, Default)]
pub struct RecordingHook {
    calls: Mutex<Vec<String>>,
    fail_phase: Option<&'static str>,
    update_barrier: Option<Arc<tokio::sync::Barrier>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when `phase` (e.g. `"before_create"`, `"after_update"`) runs.
    pub fn failing_on(mut self, phase: &'static str) -> Self {
        self.fail_phase = Some(phase);
        self
    }

    pub fn with_update_barrier(mut self, barrier: Arc<tokio::sync::Barrier>) -> Self {
        self.update_barrier = Some(barrier);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    fn record(&self, phase: &'static str, mode: Option<DispatchMode>) -> StrataResult<()> {
        let entry = match mode {
            Some(DispatchMode::Inline) => format!("{phase}:inline"),
            Some(DispatchMode::Detached) => format!("{phase}:detached"),
            None => phase.to_string(),
        };
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(entry);
        }
        if self.fail_phase == Some(phase) {
            return Err(StrataError::hook("recording", format!("{phase} refused")));
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> EntityHook<E> for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn pre_validate(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        self.record("pre_validate", None)?;
        Ok(entity)
    }

    async fn before_create(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        self.record("before_create", None)?;
        Ok(entity)
    }

    async fn before_update(
        &self,
        existing: E,
        _patch: &E::Patch,
        _ctx: &RequestContext,
    ) -> StrataResult<E> {
        self.record("before_update", None)?;
        if let Some(barrier) = &self.update_barrier {
            barrier.wait().await;
        }
        Ok(existing)
    }

    async fn before_delete(&self, entity: E, _ctx: &RequestContext) -> StrataResult<E> {
        self.record("before_delete", None)?;
        Ok(entity)
    }

    async fn after_create(
        &self,
        _entity: &E,
        _ctx: &RequestContext,
        mode: DispatchMode,
    ) -> StrataResult<()> {
        self.record("after_create", Some(mode))
    }

    async fn after_update(
        &self,
        _old: &E,
        _new: &E,
        _ctx: &RequestContext,
        mode: DispatchMode,
    ) -> StrataResult<()> {
        self.record("after_update", Some(mode))
    }

    async fn after_delete(
        &self,
        _entity: &E,
        _ctx: &RequestContext,
        mode: DispatchMode,
    ) -> StrataResult<()> {
        self.record("after_delete", Some(mode))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Engine wired to in-memory collaborators that tests can inspect.
pub struct Harness {
    pub engine: Engine,
    pub audit: InMemoryAuditSink,
    pub cache: Arc<InMemoryCacheBackend>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_hooks(HookRegistry::default())
    }

    pub fn with_hooks(hooks: HookRegistry) -> Self {
        let audit = InMemoryAuditSink::new();
        let cache = Arc::new(InMemoryCacheBackend::new());
        let engine = Engine::builder()
            .with_config(EngineConfig::default())
            .with_cache_backend(cache.clone())
            .with_audit_sink(Arc::new(audit.clone()))
            .with_hooks(hooks)
            .with_entity::<Invoice>()
            .with_entity::<Customer>()
            .build()
            .expect("test engine builds");
        Self {
            engine,
            audit,
            cache,
        }
    }

    /// Service over a fresh counting repository.
    pub fn service<E: Entity>(&self) -> (EntityService<E>, CountingRepository<E>) {
        let repository = CountingRepository::<E>::new();
        let service = self.engine.service::<E>(Arc::new(repository.clone()));
        (service, repository)
    }

    /// Number of whole-cache clears issued so far.
    pub async fn cache_clears(&self) -> u64 {
        self.cache.stats().await.map(|s| s.clears).unwrap_or(0)
    }

    /// Wait for detached audit writes and after-hooks.
    pub async fn settle(&self) {
        self.engine.flush().await;
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for the sample entities.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_tenant() -> impl Strategy<Value = String> {
        prop_oneof![Just("acme"), Just("globex"), Just("initech"), Just("umbrella")]
            .prop_map(str::to_string)
    }

    pub fn arb_status() -> impl Strategy<Value = String> {
        prop_oneof![Just("draft"), Just("sent"), Just("overdue"), Just("void")]
            .prop_map(str::to_string)
    }

    /// Person-like names, mixed case.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-zA-Z]{1,11}"
    }

    /// A valid unsaved invoice.
    pub fn arb_invoice() -> impl Strategy<Value = Invoice> {
        ("INV-[0-9]{4}", arb_name(), 0i64..10_000_000, arb_status(), any::<bool>()).prop_map(
            |(number, customer, amount, status, paid)| {
                let mut invoice = Invoice::new(number, customer, amount).with_status(status);
                invoice.paid = paid;
                invoice
            },
        )
    }

    /// A valid patch touching at least the amount.
    pub fn arb_invoice_patch() -> impl Strategy<Value = InvoicePatch> {
        (0i64..10_000_000, proptest::option::of(arb_status())).prop_map(|(amount, status)| {
            InvoicePatch {
                amount_cents: Some(amount),
                status,
                ..InvoicePatch::default()
            }
        })
    }

    /// A valid unsaved customer.
    pub fn arb_customer() -> impl Strategy<Value = Customer> {
        (arb_name(), "[a-z]{3,8}", 18i64..90).prop_map(|(name, user, age)| {
            Customer::new(name, format!("{user}@example.com"), age)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Request contexts and filter maps for common scenarios.

    use super::*;

    /// Caller holding the wildcard permission in `tenant`.
    pub fn admin(tenant: &str) -> RequestContext {
        RequestContext::new("admin")
            .with_tenant(tenant)
            .with_ip("10.0.0.1")
            .with_user_agent("strata-tests")
            .with_permission("*")
    }

    /// Caller holding exactly `permissions` in `tenant`.
    pub fn caller(actor: &str, tenant: &str, permissions: &[&str]) -> RequestContext {
        RequestContext::new(actor)
            .with_tenant(tenant)
            .with_permissions(permissions.iter().copied())
    }

    pub fn filters(pairs: &[(&str, &str)]) -> FilterParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on engine results.

    use super::*;

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_access_denied<T: std::fmt::Debug>(result: &StrataResult<T>, permission: &str) {
        match result {
            Err(StrataError::AccessDenied { permission: p }) => assert_eq!(p, permission),
            other => panic!("Expected AccessDenied({}), got: {:?}", permission, other),
        }
    }

    #[track_caller]
    pub fn assert_validation_failed<T: std::fmt::Debug>(result: &StrataResult<T>, field: &str) {
        match result {
            Err(StrataError::Validation(err)) => assert!(
                err.violations.iter().any(|v| v.field == field),
                "Expected violation on {}, got: {:?}",
                field,
                err
            ),
            other => panic!("Expected validation failure, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &StrataResult<T>) {
        match result {
            Err(StrataError::OptimisticConflict { .. }) => {}
            other => panic!("Expected OptimisticConflict, got: {:?}", other),
        }
    }
}
