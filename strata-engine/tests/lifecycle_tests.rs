//! Scenario tests for the entity lifecycle pipeline.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use strata_core::{ErrorCode, ErrorResponse, PageRequest, Sort, StrataError};
use strata_engine::{Engine, HookRegistryBuilder};
use strata_storage::{AuditOperation, Repository};
use strata_test_utils::assertions::{
    assert_conflict, assert_not_found, assert_validation_failed,
};
use strata_test_utils::fixtures::{admin, caller, filters};
use strata_test_utils::{
    Customer, CustomerPatch, FailingAuditSink, FailingCacheBackend, Harness, Invoice,
    InvoicePatch, RecordingHook,
};

fn harness_with(hook: Arc<RecordingHook>) -> Harness {
    let hooks = HookRegistryBuilder::new()
        .register_shared::<Invoice>(hook.clone())
        .register_shared::<Customer>(hook)
        .build();
    Harness::with_hooks(hooks)
}

// ============================================================================
// READS
// ============================================================================

#[tokio::test]
async fn test_find_by_id_is_served_from_cache_on_second_read() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let saved = service.create(Invoice::new("INV-1", "Ada", 100), &ctx).await.unwrap();
    let id = saved.meta.id.unwrap();

    service.find_by_id(id, &ctx).await.unwrap();
    let reads = repository.counts().find_one.load(Ordering::SeqCst);
    let again = service.find_by_id(id, &ctx).await.unwrap();

    assert_eq!(again.number, "INV-1");
    assert_eq!(repository.counts().find_one.load(Ordering::SeqCst), reads);
}

#[tokio::test]
async fn test_write_invalidates_cached_reads() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let saved = service.create(Invoice::new("INV-1", "Ada", 100), &ctx).await.unwrap();
    let id = saved.meta.id.unwrap();
    service.find_by_id(id, &ctx).await.unwrap();

    let patch = InvoicePatch {
        amount_cents: Some(250),
        ..InvoicePatch::default()
    };
    service.update(id, patch, &ctx).await.unwrap();

    let fresh = service.find_by_id(id, &ctx).await.unwrap();
    assert_eq!(fresh.amount_cents, 250);
    assert_eq!(fresh.meta.version, 1);
}

#[tokio::test]
async fn test_cached_page_is_scoped_by_tenant() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();

    service
        .create(Invoice::new("INV-A", "Ada", 1), &admin("acme"))
        .await
        .unwrap();
    let acme = service
        .find_all(&filters(&[]), PageRequest::default(), &admin("acme"))
        .await
        .unwrap();
    let globex = service
        .find_all(&filters(&[]), PageRequest::default(), &admin("globex"))
        .await
        .unwrap();

    assert_eq!(acme.total_elements, 1);
    assert_eq!(globex.total_elements, 0);
}

#[tokio::test]
async fn test_find_all_sorts_and_pages() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    for (name, age) in [("Ann", 41), ("Bob", 23), ("Cid", 35), ("Dee", 19), ("Eve", 52)] {
        service
            .create(Customer::new(name, format!("{}@example.com", name.to_lowercase()), age), &ctx)
            .await
            .unwrap();
    }

    let page = service
        .find_all(
            &filters(&[]),
            PageRequest::new(0, 2).with_sort(Sort::desc("age")),
            &ctx,
        )
        .await
        .unwrap();

    let names: Vec<_> = page.content.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Eve", "Ann"]);
    assert_eq!(page.total_elements, 5);
    assert_eq!(page.total_pages, 3);
}

#[tokio::test]
async fn test_unknown_filters_and_sorts_are_ignored() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    service
        .create(Customer::new("Ann", "ann@example.com", 41), &ctx)
        .await
        .unwrap();

    let page = service
        .find_all(
            &filters(&[("shoeSize", "44"), ("nickname_like", "an")]),
            PageRequest::new(0, 10).with_sort(Sort::asc("email")),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(page.total_elements, 1);
}

#[tokio::test]
async fn test_range_filter_on_integer_field() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    for (name, age) in [("Ann", 41), ("Bob", 23), ("Cid", 35)] {
        service
            .create(Customer::new(name, "x@example.com", age), &ctx)
            .await
            .unwrap();
    }

    let page = service
        .find_all(&filters(&[("age_gte", "30")]), PageRequest::default(), &ctx)
        .await
        .unwrap();
    let mut names: Vec<_> = page.content.into_iter().map(|c| c.name).collect();
    names.sort();
    assert_eq!(names, vec!["Ann", "Cid"]);
}

#[tokio::test]
async fn test_exists_respects_tenant_and_soft_delete() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();

    assert!(service.exists(id, &ctx).await.unwrap());
    assert!(!service.exists(id, &admin("globex")).await.unwrap());
    assert!(!service.exists(uuid::Uuid::now_v7(), &ctx).await.unwrap());

    service.delete(id, &ctx).await.unwrap();
    assert!(!service.exists(id, &ctx).await.unwrap());
    assert!(repository.counts().exists_by_id.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn test_including_deleted_stays_inside_tenant() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    service.delete(id, &ctx).await.unwrap();

    let result = service
        .find_by_id_including_deleted(id, &admin("globex"))
        .await;
    assert_not_found(&result);
}

// ============================================================================
// WRITES
// ============================================================================

#[tokio::test]
async fn test_create_stamps_metadata_and_ignores_client_identity() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let mut invoice = Invoice::new("INV-1", "Ada", 100);
    invoice.meta.id = Some(uuid::Uuid::now_v7());
    invoice.meta.version = 7;
    invoice.meta.deleted = true;
    invoice.meta.tenant_id = Some("globex".to_string());

    let saved = service.create(invoice.clone(), &ctx).await.unwrap();

    assert_ne!(saved.meta.id, invoice.meta.id);
    assert_eq!(saved.meta.version, 0);
    assert!(!saved.meta.deleted);
    assert_eq!(saved.meta.tenant_id.as_deref(), Some("acme"));
    assert_eq!(saved.meta.created_by.as_deref(), Some("admin"));
    assert!(saved.meta.created_at.is_some());
}

#[tokio::test]
async fn test_create_rejects_invalid_entity_before_saving() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Invoice>();

    let result = service
        .create(Invoice::new("  ", "Ada", -5), &admin("acme"))
        .await;
    harness.settle().await;

    assert_validation_failed(&result, "number");
    assert_validation_failed(&result, "amountCents");
    assert_eq!(repository.counts().writes(), 0);
    assert!(harness.audit.is_empty().await);
}

#[tokio::test]
async fn test_update_validates_patch_but_patch_does_not() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    let id = service
        .create(Customer::new("Ann", "ann@example.com", 41), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    let bad_email = CustomerPatch {
        email: Some("not-an-email".to_string()),
        ..CustomerPatch::default()
    };

    let rejected = service.update(id, bad_email.clone(), &ctx).await;
    assert_validation_failed(&rejected, "email");

    let patched = service.patch(id, bad_email, &ctx).await.unwrap();
    assert_eq!(patched.email, "not-an-email");
    assert_eq!(patched.name, "Ann");
    assert_eq!(patched.meta.version, 1);
}

#[tokio::test]
async fn test_update_missing_row_is_not_found() {
    let hook = Arc::new(RecordingHook::new());
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Invoice>();

    let result = service
        .update(uuid::Uuid::now_v7(), InvoicePatch::default(), &admin("acme"))
        .await;

    assert_not_found(&result);
    assert_eq!(hook.count("before_update"), 0);
    assert_eq!(repository.counts().writes(), 0);
}

#[tokio::test]
async fn test_concurrent_updates_of_one_version_conflict() {
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let hook = Arc::new(RecordingHook::new().with_update_barrier(barrier));
    let harness = harness_with(hook);
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();

    let first = InvoicePatch {
        amount_cents: Some(200),
        ..InvoicePatch::default()
    };
    let second = InvoicePatch {
        amount_cents: Some(300),
        ..InvoicePatch::default()
    };
    let (a, b) = tokio::join!(
        service.update(id, first, &ctx),
        service.update(id, second, &ctx)
    );

    let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
    assert_eq!(winner.unwrap().meta.version, 1);
    assert_conflict(&loser);
    harness.settle().await;
    assert_eq!(harness.audit.count(AuditOperation::Update).await, 1);
}

#[tokio::test]
async fn test_hard_delete_removes_row() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Customer>();
    let ctx = admin("default");

    let id = service
        .create(Customer::new("Ann", "ann@example.com", 41), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    service.delete(id, &ctx).await.unwrap();
    harness.settle().await;

    assert!(repository.inner().is_empty().await);
    assert_eq!(repository.counts().delete.load(Ordering::SeqCst), 1);
    assert_not_found(&service.find_by_id_including_deleted(id, &ctx).await);

    let deletes = harness.audit.count(AuditOperation::Delete).await;
    assert_eq!(deletes, 1);
    let record = harness
        .audit
        .records()
        .await
        .into_iter()
        .find(|r| r.operation == AuditOperation::Delete)
        .unwrap();
    assert!(record.old_value.is_some());
    assert_eq!(record.entity_id, id.to_string());
}

#[tokio::test]
async fn test_bulk_create_of_nothing_touches_nothing() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Customer>();

    let saved = service.bulk_create(Vec::new(), &admin("default")).await.unwrap();

    assert!(saved.is_empty());
    assert_eq!(repository.counts().total(), 0);
    assert_eq!(harness.cache_clears().await, 0);
}

#[tokio::test]
async fn test_bulk_create_is_all_or_nothing_on_validation() {
    let harness = Harness::new();
    let (service, repository) = harness.service::<Customer>();

    let batch = vec![
        Customer::new("Ann", "ann@example.com", 41),
        Customer::new("Bob", "no-at-sign", 23),
    ];
    let result = service.bulk_create(batch, &admin("default")).await;
    harness.settle().await;

    assert_validation_failed(&result, "email");
    assert!(repository.inner().is_empty().await);
    assert!(harness.audit.is_empty().await);
}

// ============================================================================
// AUDIT
// ============================================================================

#[tokio::test]
async fn test_audit_records_carry_caller_context() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let saved = service.create(Invoice::new("INV-1", "Ada", 100), &ctx).await.unwrap();
    service.find_by_id(saved.meta.id.unwrap(), &ctx).await.unwrap();
    harness.settle().await;

    let records = harness.audit.records().await;
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.entity_name, "Invoice");
        assert_eq!(record.actor_id, "admin");
        assert_eq!(record.tenant_id, "acme");
        assert_eq!(record.ip_address, "10.0.0.1");
        assert_eq!(record.user_agent, "strata-tests");
    }
    assert_eq!(harness.audit.count(AuditOperation::Create).await, 1);
    assert_eq!(harness.audit.count(AuditOperation::View).await, 1);
}

#[tokio::test]
async fn test_list_read_writes_one_bulk_view_record() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    for name in ["Ann", "Bob", "Cid"] {
        service
            .create(Customer::new(name, "x@example.com", 30), &ctx)
            .await
            .unwrap();
    }
    service
        .find_all(&filters(&[]), PageRequest::default(), &ctx)
        .await
        .unwrap();
    harness.settle().await;

    let views: Vec<_> = harness
        .audit
        .records()
        .await
        .into_iter()
        .filter(|r| r.operation == AuditOperation::View)
        .collect();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].entity_id, "bulk");
    assert_eq!(views[0].description.as_deref(), Some("Viewed 3 records"));
}

// ============================================================================
// COLLABORATOR FAILURES
// ============================================================================

#[tokio::test]
async fn test_failing_audit_sink_never_fails_the_caller() {
    let sink = Arc::new(FailingAuditSink::default());
    let engine = Engine::builder()
        .with_config(strata_core::EngineConfig::default())
        .with_audit_sink(sink.clone())
        .build()
        .unwrap();
    let repository = strata_test_utils::CountingRepository::<Invoice>::new();
    let service = engine.service::<Invoice>(Arc::new(repository.clone()));
    let ctx = admin("acme");

    let saved = service.create(Invoice::new("INV-1", "Ada", 100), &ctx).await.unwrap();
    service.delete(saved.meta.id.unwrap(), &ctx).await.unwrap();
    engine.flush().await;

    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(repository.inner().len().await, 1);
}

#[tokio::test]
async fn test_failing_cache_degrades_to_repository_reads() {
    let backend = Arc::new(FailingCacheBackend::default());
    let engine = Engine::builder()
        .with_config(strata_core::EngineConfig::default())
        .with_cache_backend(backend.clone())
        .build()
        .unwrap();
    let repository = strata_test_utils::CountingRepository::<Invoice>::new();
    let service = engine.service::<Invoice>(Arc::new(repository.clone()));
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    service.find_by_id(id, &ctx).await.unwrap();
    service.find_by_id(id, &ctx).await.unwrap();

    assert!(backend.calls.load(Ordering::SeqCst) > 0);
    assert_eq!(repository.counts().find_one.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disabled_cache_is_never_consulted() {
    let harness_cache = Arc::new(strata_storage::InMemoryCacheBackend::new());
    let engine = Engine::builder()
        .with_config(strata_core::EngineConfig::default().with_cache_enabled(false))
        .with_cache_backend(harness_cache.clone())
        .build()
        .unwrap();
    let repository = strata_test_utils::CountingRepository::<Customer>::new();
    let service = engine.service::<Customer>(Arc::new(repository));
    let ctx = admin("default");

    service
        .create(Customer::new("Ann", "ann@example.com", 41), &ctx)
        .await
        .unwrap();
    service
        .find_all(&filters(&[]), PageRequest::default(), &ctx)
        .await
        .unwrap();

    assert_eq!(harness_cache.len("Customer"), 0);
}

// ============================================================================
// HOOKS
// ============================================================================

#[tokio::test]
async fn test_create_runs_every_hook_phase() {
    let hook = Arc::new(RecordingHook::new());
    let harness = harness_with(hook.clone());
    let (service, _) = harness.service::<Invoice>();

    service
        .create(Invoice::new("INV-1", "Ada", 100), &admin("acme"))
        .await
        .unwrap();
    harness.settle().await;

    let calls = hook.calls();
    assert_eq!(&calls[..3], &["pre_validate", "before_create", "after_create:inline"]);
    assert_eq!(hook.count("after_create:detached"), 1);
}

#[tokio::test]
async fn test_before_hook_failure_aborts_write() {
    let hook = Arc::new(RecordingHook::new().failing_on("before_create"));
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Invoice>();

    let result = service
        .create(Invoice::new("INV-1", "Ada", 100), &admin("acme"))
        .await;
    harness.settle().await;

    assert!(matches!(result, Err(StrataError::Hook { .. })));
    assert_eq!(repository.counts().writes(), 0);
    assert!(harness.audit.is_empty().await);
    assert_eq!(hook.count("after_create:inline"), 0);
}

#[tokio::test]
async fn test_pre_validate_failure_reads_as_validation_error() {
    let hook = Arc::new(RecordingHook::new().failing_on("pre_validate"));
    let harness = harness_with(hook);
    let (service, repository) = harness.service::<Invoice>();

    let result = service
        .create(Invoice::new("INV-1", "Ada", 100), &admin("acme"))
        .await;

    assert!(matches!(result, Err(StrataError::Validation(_))));
    assert_eq!(repository.counts().writes(), 0);
}

#[tokio::test]
async fn test_inline_after_update_failure_restores_previous_row() {
    let hook = Arc::new(RecordingHook::new().failing_on("after_update"));
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    let clears_before = harness.cache_clears().await;

    let patch = InvoicePatch {
        paid: Some(true),
        ..InvoicePatch::default()
    };
    let result = service.update(id, patch, &ctx).await;
    harness.settle().await;

    assert!(matches!(result, Err(StrataError::Hook { .. })));
    let stored = repository.inner().get_raw(id).await.unwrap();
    assert!(!stored.paid);
    assert_eq!(stored.meta.version, 0);
    assert_eq!(repository.counts().revert.load(Ordering::SeqCst), 1);
    assert_eq!(harness.audit.count(AuditOperation::Update).await, 0);
    assert_eq!(harness.cache_clears().await, clears_before + 1);
    assert_eq!(hook.count("after_update:detached"), 0);

    // The restored version is current, so a retry reaches the hook again
    // instead of conflicting.
    let retry = service.patch(id, InvoicePatch::default(), &ctx).await;
    assert!(matches!(retry, Err(StrataError::Hook { .. })));
    assert_eq!(repository.inner().get_raw(id).await.unwrap().meta.version, 0);
}

#[tokio::test]
async fn test_failed_create_leaves_no_row_to_duplicate_on_retry() {
    let hook = Arc::new(RecordingHook::new().failing_on("after_create"));
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Invoice>();
    let ctx = admin("acme");
    let invoice = Invoice::new("INV-1", "Ada", 100);

    let first = service.create(invoice.clone(), &ctx).await;
    let retry = service.create(invoice, &ctx).await;
    harness.settle().await;

    assert!(matches!(first, Err(StrataError::Hook { .. })));
    assert!(matches!(retry, Err(StrataError::Hook { .. })));
    assert!(repository.inner().is_empty().await);
    assert!(harness.audit.is_empty().await);
    assert_eq!(hook.count("after_create:inline"), 2);
    assert_eq!(hook.count("after_create:detached"), 0);

    let visible = service
        .find_all(&filters(&[]), PageRequest::default(), &ctx)
        .await
        .unwrap();
    assert_eq!(visible.total_elements, 0);
}

#[tokio::test]
async fn test_inline_after_delete_failure_keeps_row_visible() {
    let hook = Arc::new(RecordingHook::new().failing_on("after_delete"));
    let harness = harness_with(hook);
    let (service, _) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let id = service
        .create(Invoice::new("INV-1", "Ada", 100), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    let result = service.delete(id, &ctx).await;
    harness.settle().await;

    assert!(matches!(result, Err(StrataError::Hook { .. })));
    let found = service.find_by_id(id, &ctx).await.unwrap();
    assert!(!found.meta.deleted);
    assert!(found.meta.deleted_by.is_none());
    assert_eq!(harness.audit.count(AuditOperation::Delete).await, 0);
}

#[tokio::test]
async fn test_inline_after_hook_failure_reverts_whole_batch() {
    let hook = Arc::new(RecordingHook::new().failing_on("after_create"));
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Customer>();

    let batch = vec![
        Customer::new("Ann", "ann@example.com", 41),
        Customer::new("Bob", "bob@example.com", 23),
        Customer::new("Cid", "cid@example.com", 35),
    ];
    let result = service.bulk_create(batch, &admin("default")).await;
    harness.settle().await;

    assert!(matches!(result, Err(StrataError::Hook { .. })));
    assert!(repository.inner().is_empty().await);
    assert_eq!(repository.counts().revert.load(Ordering::SeqCst), 3);
    assert!(harness.audit.is_empty().await);
    assert_eq!(hook.count("after_create:inline"), 1);
    assert_eq!(hook.count("after_create:detached"), 0);
}

#[tokio::test]
async fn test_not_found_leaves_no_trace() {
    let hook = Arc::new(RecordingHook::new());
    let harness = harness_with(hook.clone());
    let (service, repository) = harness.service::<Invoice>();
    let ctx = admin("acme");

    let mut foreign = Invoice::new("INV-9", "Zed", 900);
    foreign.meta.tenant_id = Some("globex".to_string());
    let foreign_id = repository
        .inner()
        .save(foreign)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    let missing_id = uuid::Uuid::now_v7();

    for id in [missing_id, foreign_id] {
        assert_not_found(&service.find_by_id(id, &ctx).await);
        assert_not_found(&service.find_by_id_including_deleted(id, &ctx).await);
        assert_not_found(&service.update(id, InvoicePatch::default(), &ctx).await);
        assert_not_found(&service.patch(id, InvoicePatch::default(), &ctx).await);
        assert_not_found(&service.delete(id, &ctx).await);
    }
    harness.settle().await;

    assert!(harness.audit.records().await.is_empty());
    assert_eq!(harness.cache.len("Invoice"), 0);
    assert_eq!(harness.cache_clears().await, 0);
    assert!(hook.calls().is_empty());
    assert_eq!(repository.counts().writes(), 0);
    let untouched = repository.inner().get_raw(foreign_id).await.unwrap();
    assert!(!untouched.meta.deleted);
    assert_eq!(untouched.meta.version, 0);
}

#[tokio::test]
async fn test_delete_runs_delete_hooks() {
    let hook = Arc::new(RecordingHook::new());
    let harness = harness_with(hook.clone());
    let (service, _) = harness.service::<Customer>();
    let ctx = admin("default");

    let id = service
        .create(Customer::new("Ann", "ann@example.com", 41), &ctx)
        .await
        .unwrap()
        .meta
        .id
        .unwrap();
    service.delete(id, &ctx).await.unwrap();
    harness.settle().await;

    assert_eq!(hook.count("before_delete"), 1);
    assert_eq!(hook.count("after_delete:inline"), 1);
    assert_eq!(hook.count("after_delete:detached"), 1);
}

// ============================================================================
// PERMISSIONS, ROUTES AND ERROR SHAPE
// ============================================================================

#[tokio::test]
async fn test_exact_permission_is_enough() {
    let harness = Harness::new();
    let (service, _) = harness.service::<Invoice>();
    let ctx = caller("clerk", "acme", &["invoice:create", "invoice:view"]);

    let saved = service.create(Invoice::new("INV-1", "Ada", 100), &ctx).await.unwrap();
    let found = service.find_by_id(saved.meta.id.unwrap(), &ctx).await.unwrap();
    assert_eq!(found.meta.created_by.as_deref(), Some("clerk"));

    let denied = service.delete(saved.meta.id.unwrap(), &ctx).await.unwrap_err();
    let body = ErrorResponse::from(&denied);
    assert_eq!(body.code, ErrorCode::AccessDenied);
    assert_eq!(body.code.status_code(), 403);
}

#[test]
fn test_route_table_resolves_declared_types() {
    let harness = Harness::new();
    let routes = harness.engine.routes();

    assert_eq!(routes.len(), 2);
    assert_eq!(routes.resolve("/api/invoices/123").map(|d| d.name), Some("Invoice"));
    assert_eq!(routes.resolve("/api/customers").map(|d| d.name), Some("Customer"));
    assert!(routes.resolve("/api/unknown").is_none());
    assert!(routes.by_name("Customer").is_some());
}

#[test]
fn test_internal_errors_hide_their_reason() {
    let err = StrataError::internal("connection refused on 10.0.0.5");
    let body = ErrorResponse::from(&err);

    assert_eq!(body.code, ErrorCode::ServerError);
    assert!(!body.message.contains("10.0.0.5"));
}
