//! Per-entity-id locks for merges.
//!
//! A merge holds its source, its target and every entity whose references it
//! rewrites for its whole duration. A set of ids is acquired atomically (all
//! or none) under one mutex, so merges that touch a common entity serialize
//! while disjoint merges proceed in parallel, and no lock-order deadlock is
//! possible.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::model::EntityId;

/// Registry of entity ids currently held by a merge.
#[derive(Debug, Default)]
pub struct EntityLockManager {
    held: Mutex<HashSet<EntityId>>,
    released: Condvar,
}

impl EntityLockManager {
    /// Creates a manager with nothing held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<EntityId>> {
        // Only whole inserts and removes touch the set, so a poisoned lock is still valid.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until both ids are free, then holds them.
    pub fn lock_pair(&self, first: EntityId, second: EntityId) -> EntityGuard<'_> {
        self.lock_set([first, second])
    }

    /// Holds both ids if both are free right now.
    pub fn try_lock_pair(&self, first: EntityId, second: EntityId) -> Option<EntityGuard<'_>> {
        self.try_lock_set([first, second])
    }

    /// Blocks until every id is free, then holds them all.
    pub fn lock_set(&self, ids: impl IntoIterator<Item = EntityId>) -> EntityGuard<'_> {
        let ids: BTreeSet<EntityId> = ids.into_iter().collect();
        let mut held = self.held();
        while ids.iter().any(|id| held.contains(id)) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.extend(ids.iter().copied());
        EntityGuard { manager: self, ids }
    }

    /// Holds every id if all of them are free right now.
    pub fn try_lock_set(&self, ids: impl IntoIterator<Item = EntityId>) -> Option<EntityGuard<'_>> {
        let ids: BTreeSet<EntityId> = ids.into_iter().collect();
        let mut held = self.held();
        if ids.iter().any(|id| held.contains(id)) {
            return None;
        }
        held.extend(ids.iter().copied());
        Some(EntityGuard { manager: self, ids })
    }

    /// Whether a merge currently holds `id`.
    #[must_use]
    pub fn is_locked(&self, id: EntityId) -> bool {
        self.held().contains(&id)
    }

    fn release(&self, ids: &BTreeSet<EntityId>) {
        let mut held = self.held();
        for id in ids {
            held.remove(id);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Holds a set of entity ids until dropped.
#[derive(Debug)]
pub struct EntityGuard<'a> {
    manager: &'a EntityLockManager,
    ids: BTreeSet<EntityId>,
}

impl EntityGuard<'_> {
    /// The held ids, ascending.
    #[must_use]
    pub fn ids(&self) -> &BTreeSet<EntityId> {
        &self.ids
    }

    /// Whether this guard holds `id`.
    #[must_use]
    pub fn holds(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.ids);
    }
}
