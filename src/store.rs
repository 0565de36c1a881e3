//! Persistence collaborators.
//!
//! The conversion and merge engines talk to persistence through two narrow
//! traits: [`EntityStore`] for canonical records and [`ReferenceRepository`]
//! for "who points at this entity" queries and single-reference rewrites.
//! [`InMemoryStore`] implements both and is what embedders use for tests and
//! dry runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{CanonicalEntity, EntityId, EntityKind, ImportProvenance, ReferenceSlot, RunId, SourceKey};

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A persisted canonical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    /// Store id.
    pub id: EntityId,
    /// Harvest origin; `None` for records created locally.
    pub source: Option<SourceKey>,
    /// Canonical content.
    pub entity: CanonicalEntity,
    /// Import provenance; `None` for records created locally.
    pub provenance: Option<ImportProvenance>,
}

impl StoredEntity {
    /// Kind of the stored entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.entity.kind()
    }

    /// Whether the record has been committed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.provenance.as_ref().is_some_and(|p| p.loaded)
    }
}

/// Canonical entity persistence.
pub trait EntityStore: Send + Sync {
    /// Loads an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn find(&self, id: EntityId) -> StoreResult<Option<StoredEntity>>;

    /// Loads the entity harvested under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn find_by_source(&self, key: &SourceKey) -> StoreResult<Option<StoredEntity>>;

    /// Persists a new entity and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn insert(
        &self,
        source: Option<SourceKey>,
        entity: CanonicalEntity,
        provenance: Option<ImportProvenance>,
    ) -> StoreResult<EntityId>;

    /// Replaces an existing entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entity has `stored.id`.
    fn update(&self, stored: &StoredEntity) -> StoreResult<()>;

    /// Removes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entity has `id`.
    fn delete(&self, id: EntityId) -> StoreResult<()>;

    /// Every entity of a kind, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn list(&self, kind: EntityKind) -> StoreResult<Vec<StoredEntity>>;

    /// Every entity last imported by `run`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn list_by_run(&self, run: RunId) -> StoreResult<Vec<StoredEntity>> {
        let mut found = Vec::new();
        for kind in ALL_KINDS {
            found.extend(
                self.list(kind)?
                    .into_iter()
                    .filter(|e| e.provenance.as_ref().is_some_and(|p| p.run == run)),
            );
        }
        Ok(found)
    }
}

/// Every entity kind, in declaration order.
pub const ALL_KINDS: [EntityKind; 7] = [
    EntityKind::Person,
    EntityKind::OrgUnit,
    EntityKind::Event,
    EntityKind::Product,
    EntityKind::Patent,
    EntityKind::Publication,
    EntityKind::PublicationSeries,
];

/// One reference from `holder` to `target` through `slot`.
///
/// A holder that references the same target several times in one slot (the
/// same person listed twice as author) is reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    /// Entity that holds the reference.
    pub holder: EntityId,
    /// Slot the reference lives in.
    pub slot: ReferenceSlot,
    /// Referenced entity.
    pub target: EntityId,
}

/// Reverse-reference queries and rewrites.
pub trait ReferenceRepository: Send + Sync {
    /// Every reference pointing at `target`, ordered by holder then slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the backend fails.
    fn dependents_of(&self, target: EntityId) -> StoreResult<Vec<Reference>>;

    /// Rewrites `reference` to point at `to`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StaleReference`] when the holder no longer points
    /// at `reference.target` through `reference.slot`.
    fn repoint(&self, reference: &Reference, to: EntityId) -> StoreResult<()>;
}

macro_rules! forward_store {
    ($($wrapper:ty),*) => {$(
        impl<T: EntityStore + ?Sized> EntityStore for $wrapper {
            fn find(&self, id: EntityId) -> StoreResult<Option<StoredEntity>> {
                (**self).find(id)
            }
            fn find_by_source(&self, key: &SourceKey) -> StoreResult<Option<StoredEntity>> {
                (**self).find_by_source(key)
            }
            fn insert(
                &self,
                source: Option<SourceKey>,
                entity: CanonicalEntity,
                provenance: Option<ImportProvenance>,
            ) -> StoreResult<EntityId> {
                (**self).insert(source, entity, provenance)
            }
            fn update(&self, stored: &StoredEntity) -> StoreResult<()> {
                (**self).update(stored)
            }
            fn delete(&self, id: EntityId) -> StoreResult<()> {
                (**self).delete(id)
            }
            fn list(&self, kind: EntityKind) -> StoreResult<Vec<StoredEntity>> {
                (**self).list(kind)
            }
            fn list_by_run(&self, run: RunId) -> StoreResult<Vec<StoredEntity>> {
                (**self).list_by_run(run)
            }
        }

        impl<T: ReferenceRepository + ?Sized> ReferenceRepository for $wrapper {
            fn dependents_of(&self, target: EntityId) -> StoreResult<Vec<Reference>> {
                (**self).dependents_of(target)
            }
            fn repoint(&self, reference: &Reference, to: EntityId) -> StoreResult<()> {
                (**self).repoint(reference, to)
            }
        }
    )*};
}

forward_store!(&T, Arc<T>);

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    entities: BTreeMap<EntityId, StoredEntity>,
    by_source: HashMap<SourceKey, EntityId>,
}

/// Thread-safe in-memory [`EntityStore`] and [`ReferenceRepository`].
///
/// Every successful mutation (insert, update, delete, repoint) increments a
/// write counter, which tests use to prove an operation wrote nothing.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations so far.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the lock is poisoned.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.entities.len())
    }

    /// Whether the store holds no entities.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the lock is poisoned.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl EntityStore for InMemoryStore {
    fn find(&self, id: EntityId) -> StoreResult<Option<StoredEntity>> {
        Ok(self.lock()?.entities.get(&id).cloned())
    }

    fn find_by_source(&self, key: &SourceKey) -> StoreResult<Option<StoredEntity>> {
        let tables = self.lock()?;
        Ok(tables
            .by_source
            .get(key)
            .and_then(|id| tables.entities.get(id))
            .cloned())
    }

    fn insert(
        &self,
        source: Option<SourceKey>,
        entity: CanonicalEntity,
        provenance: Option<ImportProvenance>,
    ) -> StoreResult<EntityId> {
        let mut tables = self.lock()?;
        tables.next_id += 1;
        let id = EntityId(tables.next_id);
        if let Some(key) = &source {
            tables.by_source.insert(key.clone(), id);
        }
        tables.entities.insert(
            id,
            StoredEntity {
                id,
                source,
                entity,
                provenance,
            },
        );
        self.wrote();
        Ok(id)
    }

    fn update(&self, stored: &StoredEntity) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let slot = tables
            .entities
            .get_mut(&stored.id)
            .ok_or(StoreError::NotFound(stored.id))?;
        *slot = stored.clone();
        if let Some(key) = &stored.source {
            tables.by_source.insert(key.clone(), stored.id);
        }
        self.wrote();
        Ok(())
    }

    fn delete(&self, id: EntityId) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let removed = tables.entities.remove(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(key) = removed.source {
            tables.by_source.remove(&key);
        }
        self.wrote();
        Ok(())
    }

    fn list(&self, kind: EntityKind) -> StoreResult<Vec<StoredEntity>> {
        Ok(self
            .lock()?
            .entities
            .values()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect())
    }
}

impl ReferenceRepository for InMemoryStore {
    fn dependents_of(&self, target: EntityId) -> StoreResult<Vec<Reference>> {
        let tables = self.lock()?;
        let mut found = Vec::new();
        for stored in tables.entities.values() {
            for (slot, referenced) in stored.entity.references() {
                let reference = Reference {
                    holder: stored.id,
                    slot,
                    target,
                };
                if referenced == target && !found.contains(&reference) {
                    found.push(reference);
                }
            }
        }
        Ok(found)
    }

    fn repoint(&self, reference: &Reference, to: EntityId) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let holder = tables
            .entities
            .get_mut(&reference.holder)
            .ok_or(StoreError::NotFound(reference.holder))?;
        if holder.entity.repoint(reference.slot, reference.target, to) == 0 {
            return Err(StoreError::StaleReference {
                holder: reference.holder,
                expected: reference.target,
            });
        }
        self.wrote();
        Ok(())
    }
}
