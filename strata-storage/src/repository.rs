//! Persistence collaborator contract and the in-memory repository.
//!
//! The engine talks to storage exclusively through [`Repository`]. The
//! repository is responsible for atomicity of each call and for honouring
//! the optimistic version counter: saving an entity whose version does not
//! match the stored row must fail with [`StorageError::OptimisticConflict`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use strata_core::{
    new_entity_id, Entity, EntityId, Page, PageRequest, Predicate, StorageError,
};
use tokio::sync::RwLock;

// ============================================================================
// REPOSITORY TRAIT
// ============================================================================

/// Storage contract for one entity type.
///
/// Predicates are applied exactly as given. The repository never injects
/// soft-delete or tenant conditions of its own, which is what lets the
/// engine offer an explicit include-deleted read.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Page of rows matching `predicate`.
    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> Result<Page<E>, StorageError>;

    /// First row matching `predicate`.
    async fn find_one(&self, predicate: &Predicate) -> Result<Option<E>, StorageError>;

    /// Insert (no id, or unknown id) or update (known id, matching version).
    async fn save(&self, entity: E) -> Result<E, StorageError>;

    /// Save every entity or none of them.
    async fn save_all(&self, entities: Vec<E>) -> Result<Vec<E>, StorageError>;

    /// Physically remove a row.
    async fn delete(&self, entity: &E) -> Result<(), StorageError>;

    async fn exists_by_id(&self, id: EntityId) -> Result<bool, StorageError>;

    /// Undo a committed write: put `previous` back under `committed`'s id,
    /// or remove the row when there is no previous state.
    ///
    /// Fails with [`StorageError::OptimisticConflict`] if another writer
    /// changed the row after `committed` was stored.
    async fn revert(&self, committed: &E, previous: Option<E>) -> Result<(), StorageError>;
}

// ============================================================================
// IN-MEMORY REPOSITORY
// ============================================================================

/// In-memory repository backed by a `HashMap` behind an async `RwLock`.
///
/// Writers are serialized by the lock, so a version check and the write
/// that follows it are atomic.
#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    rows: Arc<RwLock<HashMap<EntityId, E>>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Clone for InMemoryRepository<E> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, deleted ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Read a row by id, bypassing every predicate.
    pub async fn get_raw(&self, id: EntityId) -> Option<E> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Remove all stored rows.
    pub async fn clear(&self) {
        self.rows.write().await.clear();
    }
}

/// Assign identity and version for a write against the current row state.
fn prepare<E: Entity>(stored: Option<&E>, mut entity: E) -> Result<E, StorageError> {
    match (entity.meta().id, stored) {
        (None, _) => {
            let meta = entity.meta_mut();
            meta.id = Some(new_entity_id());
            meta.version = 0;
        }
        (Some(_), None) => entity.meta_mut().version = 0,
        (Some(id), Some(current)) => {
            let expected = entity.meta().version;
            let actual = current.meta().version;
            if expected != actual {
                tracing::debug!(entity = E::entity_name(), id = %id, expected, actual, "Stale version rejected");
                return Err(StorageError::OptimisticConflict {
                    entity: E::entity_name().to_string(),
                    id,
                    expected,
                    actual,
                });
            }
            entity.meta_mut().version = actual + 1;
        }
    }
    Ok(entity)
}

fn sorted_matches<E: Entity>(
    rows: &HashMap<EntityId, E>,
    predicate: &Predicate,
    page: &PageRequest,
) -> Vec<E> {
    let mut matches: Vec<E> = rows
        .values()
        .filter(|row| predicate.matches(*row))
        .cloned()
        .collect();

    matches.sort_by(|a, b| {
        let by_sort = page
            .sort
            .as_ref()
            .map(|sort| sort.compare(a, b))
            .unwrap_or(std::cmp::Ordering::Equal);
        by_sort.then_with(|| a.meta().id.cmp(&b.meta().id))
    });
    matches
}

#[async_trait]
impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> Result<Page<E>, StorageError> {
        let rows = self.rows.read().await;
        let matches = sorted_matches(&rows, predicate, page);
        let total = matches.len() as u64;
        let content = matches
            .into_iter()
            .skip(page.offset())
            .take(page.size as usize)
            .collect();
        Ok(Page::new(content, page, total))
    }

    async fn find_one(&self, predicate: &Predicate) -> Result<Option<E>, StorageError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| predicate.matches(*row))
            .min_by_key(|row| row.meta().id)
            .cloned())
    }

    async fn save(&self, entity: E) -> Result<E, StorageError> {
        let mut rows = self.rows.write().await;
        let stored = entity.meta().id.and_then(|id| rows.get(&id));
        let saved = prepare(stored, entity)?;
        if let Some(id) = saved.meta().id {
            rows.insert(id, saved.clone());
        }
        Ok(saved)
    }

    async fn save_all(&self, entities: Vec<E>) -> Result<Vec<E>, StorageError> {
        let mut rows = self.rows.write().await;
        let mut seen = HashSet::with_capacity(entities.len());
        let mut prepared = Vec::with_capacity(entities.len());

        for entity in entities {
            if let Some(id) = entity.meta().id {
                if !seen.insert(id) {
                    return Err(StorageError::DuplicateId {
                        entity: E::entity_name().to_string(),
                        id,
                    });
                }
            }
            let stored = entity.meta().id.and_then(|id| rows.get(&id));
            prepared.push(prepare(stored, entity)?);
        }

        for saved in &prepared {
            if let Some(id) = saved.meta().id {
                rows.insert(id, saved.clone());
            }
        }
        Ok(prepared)
    }

    async fn delete(&self, entity: &E) -> Result<(), StorageError> {
        let Some(id) = entity.meta().id else {
            return Err(StorageError::Backend {
                reason: format!("cannot delete unsaved {}", E::entity_name()),
            });
        };
        match self.rows.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                entity: E::entity_name().to_string(),
                id,
            }),
        }
    }

    async fn exists_by_id(&self, id: EntityId) -> Result<bool, StorageError> {
        Ok(self.rows.read().await.contains_key(&id))
    }

    async fn revert(&self, committed: &E, previous: Option<E>) -> Result<(), StorageError> {
        let Some(id) = committed.meta().id else {
            return Err(StorageError::Backend {
                reason: format!("cannot revert unsaved {}", E::entity_name()),
            });
        };
        let mut rows = self.rows.write().await;
        if let Some(current) = rows.get(&id) {
            let expected = committed.meta().version;
            let actual = current.meta().version;
            if expected != actual {
                return Err(StorageError::OptimisticConflict {
                    entity: E::entity_name().to_string(),
                    id,
                    expected,
                    actual,
                });
            }
        }

        let restored = previous.is_some();
        match previous {
            Some(row) => {
                rows.insert(id, row);
            }
            None => {
                rows.remove(&id);
            }
        }
        tracing::debug!(entity = E::entity_name(), id = %id, restored, "Write reverted");
        Ok(())
    }
}
