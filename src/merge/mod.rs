//! Reconciliation: merging duplicate entities.
//!
//! A merge moves everything that points at a *source* entity over to a
//! *target* entity of the same kind and then deletes the source:
//!
//! 1. **Validation.** Self-merges, missing ids, kind mismatches and org-unit
//!    merges that would make the target part of itself are rejected with
//!    [`HarvestError::MergeValidation`] before anything is written.
//! 2. **Re-pointing.** Every dependent reference is rewritten. Each holder is
//!    snapshotted before its first rewrite; if any step fails, the snapshots
//!    are written back in reverse order and the merge fails with
//!    [`HarvestError::MergeConsistency`].
//! 3. **Deletion.** The source is deleted only after every reference moved.
//!
//! The source, the target and every holder stay locked in the engine's
//! [`EntityLockManager`] from validation to deletion. Merges that touch a
//! common entity, including a holder that references both of their sources,
//! run one after another, so a rollback never overwrites another merge's
//! rewrite.

mod locks;
mod matching;

pub use locks::{EntityGuard, EntityLockManager};
pub use matching::{DuplicateMatcher, MatchConfidence, MergeCandidatePair, DEFAULT_SIMILARITY_THRESHOLD};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{error, info};

use crate::convert::is_ancestor;
use crate::error::{HarvestError, Result, StoreError};
use crate::model::{CanonicalEntity, EntityId, EntityKind, ReferenceSlot};
use crate::store::{EntityStore, Reference, ReferenceRepository, StoredEntity};

/// What a successful merge did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Entity merged away.
    pub source: EntityId,
    /// Entity that received the dependents.
    pub target: EntityId,
    /// References re-pointed.
    pub repointed: usize,
    /// Fields or names folded from the source into the target.
    pub folded: usize,
    /// Whether the source was deleted.
    pub source_deleted: bool,
}

/// Which dependents move and what happens to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeMode {
    /// Move every dependent, delete the source.
    Full,
    /// Move every dependent, fold series data into the target, delete the source.
    Series,
    /// Move only `PublishedIn` references, keep the source.
    PublicationsOnly,
}

/// Snapshot undo log of one merge.
#[derive(Debug, Default)]
struct UndoLog {
    snapshots: IndexMap<EntityId, StoredEntity>,
}

impl UndoLog {
    /// Snapshots `id` unless already snapshotted.
    fn capture<S: EntityStore + ?Sized>(&mut self, store: &S, id: EntityId) -> Result<()> {
        if !self.snapshots.contains_key(&id) {
            if let Some(stored) = store.find(id)? {
                self.snapshots.insert(id, stored);
            }
        }
        Ok(())
    }

    /// Writes every snapshot back, newest first. Returns whether all succeeded.
    fn restore<S: EntityStore + ?Sized>(&self, store: &S) -> bool {
        let mut complete = true;
        for snapshot in self.snapshots.values().rev() {
            if let Err(err) = store.update(snapshot) {
                error!(holder = %snapshot.id, %err, "cannot restore snapshot");
                complete = false;
            }
        }
        complete
    }
}

/// Executes merges against a store and its reference repository.
#[derive(Debug)]
pub struct MergeEngine<S, R> {
    store: S,
    references: R,
    locks: EntityLockManager,
}

impl<S, R> MergeEngine<S, R>
where
    S: EntityStore,
    R: ReferenceRepository,
{
    /// Creates an engine with its own lock manager.
    pub fn new(store: S, references: R) -> Self {
        Self {
            store,
            references,
            locks: EntityLockManager::new(),
        }
    }

    /// The engine's lock manager.
    #[must_use]
    pub fn locks(&self) -> &EntityLockManager {
        &self.locks
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Merges `source` into `target`, both of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::MergeValidation`] without writing anything for
    /// invalid requests, and [`HarvestError::MergeConsistency`] after rolling
    /// back when a write fails part way.
    pub fn merge_entities(&self, kind: EntityKind, source: EntityId, target: EntityId) -> Result<MergeOutcome> {
        let mode = if kind == EntityKind::PublicationSeries {
            MergeMode::Series
        } else {
            MergeMode::Full
        };
        self.merge(kind, source, target, mode)
    }

    /// Merges a journal or other series into another, folding the source's
    /// ISSNs and titles in languages the target lacks into the target.
    ///
    /// # Errors
    ///
    /// See [`merge_entities`](Self::merge_entities).
    pub fn merge_publication_series(&self, source: EntityId, target: EntityId) -> Result<MergeOutcome> {
        self.merge(EntityKind::PublicationSeries, source, target, MergeMode::Series)
    }

    /// Moves every publication published in `source` onto `target` and keeps
    /// the (now empty) source series.
    ///
    /// # Errors
    ///
    /// See [`merge_entities`](Self::merge_entities).
    pub fn merge_all_publications_onto_series(&self, source: EntityId, target: EntityId) -> Result<MergeOutcome> {
        self.merge(EntityKind::PublicationSeries, source, target, MergeMode::PublicationsOnly)
    }

    fn merge(&self, kind: EntityKind, source: EntityId, target: EntityId, mode: MergeMode) -> Result<MergeOutcome> {
        if source == target {
            return Err(HarvestError::MergeValidation(format!(
                "cannot merge {source} into itself"
            )));
        }
        let (_guard, dependents) = self.lock_with_holders(source, target, mode)?;
        info!(%kind, %source, %target, ?mode, holders = dependents.len(), "merge started");

        let (source_entity, target_entity) = self.validate(kind, source, target)?;
        if let Some(cyclic) = dependents.iter().find(|r| r.holder == target) {
            return Err(HarvestError::MergeValidation(format!(
                "{target} references {source} through {:?}; merging would make it reference itself",
                cyclic.slot
            )));
        }

        let mut undo = UndoLog::default();
        match self.apply(mode, &source_entity, target_entity, &dependents, &mut undo) {
            Ok(outcome) => {
                info!(
                    %source,
                    %target,
                    repointed = outcome.repointed,
                    folded = outcome.folded,
                    "merge finished"
                );
                Ok(outcome)
            },
            Err(err) => {
                let rolled_back = undo.restore(&self.store);
                error!(%source, %target, %err, rolled_back, "merge aborted");
                Err(HarvestError::MergeConsistency {
                    source_id: source,
                    target_id: target,
                    message: err.to_string(),
                    rolled_back,
                })
            },
        }
    }

    /// References to `source` that `mode` moves.
    fn dependents(&self, source: EntityId, mode: MergeMode) -> Result<Vec<Reference>> {
        Ok(self
            .references
            .dependents_of(source)?
            .into_iter()
            .filter(|r| mode != MergeMode::PublicationsOnly || r.slot == ReferenceSlot::PublishedIn)
            .collect())
    }

    /// Locks `source`, `target` and every holder of a reference to move.
    ///
    /// Holders are only known once the pair is held. When new ones show up,
    /// everything is released and the grown set is acquired in one step, so
    /// the engine never waits while holding a lock.
    fn lock_with_holders(
        &self,
        source: EntityId,
        target: EntityId,
        mode: MergeMode,
    ) -> Result<(EntityGuard<'_>, Vec<Reference>)> {
        let mut guard = self.locks.lock_pair(source, target);
        loop {
            let dependents = self.dependents(source, mode)?;
            let missing: Vec<EntityId> = dependents
                .iter()
                .map(|r| r.holder)
                .filter(|holder| !guard.holds(*holder))
                .collect();
            if missing.is_empty() {
                return Ok((guard, dependents));
            }
            let ids: Vec<EntityId> = guard.ids().iter().copied().chain(missing).collect();
            drop(guard);
            guard = self.locks.lock_set(ids);
        }
    }

    /// Loads both entities and checks kinds and hierarchy.
    fn validate(&self, kind: EntityKind, source: EntityId, target: EntityId) -> Result<(StoredEntity, StoredEntity)> {
        let load = |id: EntityId, role: &str| -> Result<StoredEntity> {
            let stored = self
                .store
                .find(id)?
                .ok_or_else(|| HarvestError::MergeValidation(format!("{role} {id} does not exist")))?;
            if stored.kind() != kind {
                return Err(HarvestError::MergeValidation(format!(
                    "{role} {id} is a {}, not a {kind}",
                    stored.kind()
                )));
            }
            Ok(stored)
        };
        let source_entity = load(source, "source")?;
        let target_entity = load(target, "target")?;

        if kind == EntityKind::OrgUnit {
            let store = &self.store;
            let parent_of = |id: EntityId| -> std::result::Result<Option<EntityId>, StoreError> {
                Ok(store.find(id)?.and_then(|s| match s.entity {
                    CanonicalEntity::OrgUnit(unit) => unit.parent,
                    _ => None,
                }))
            };
            if is_ancestor(target, source, parent_of)? {
                return Err(HarvestError::MergeValidation(format!(
                    "{target} is part of {source}; merging would make it part of itself"
                )));
            }
        }
        Ok((source_entity, target_entity))
    }

    /// Steps 2 and 3. Every write is preceded by a snapshot in `undo`.
    fn apply(
        &self,
        mode: MergeMode,
        source: &StoredEntity,
        mut target: StoredEntity,
        dependents: &[Reference],
        undo: &mut UndoLog,
    ) -> Result<MergeOutcome> {
        for reference in dependents {
            undo.capture(&self.store, reference.holder)?;
            self.references.repoint(reference, target.id)?;
        }

        let mut folded = 0;
        if mode == MergeMode::Series {
            folded = fold_series(&mut target.entity, &source.entity);
            if folded > 0 {
                undo.capture(&self.store, target.id)?;
                self.store.update(&target)?;
            }
        }

        let source_deleted = mode != MergeMode::PublicationsOnly;
        if source_deleted {
            self.store.delete(source.id)?;
        }

        Ok(MergeOutcome {
            source: source.id,
            target: target.id,
            repointed: dependents.len(),
            folded,
            source_deleted,
        })
    }
}

/// Copies the source series' missing ISSNs and titles onto the target.
fn fold_series(target: &mut CanonicalEntity, source: &CanonicalEntity) -> usize {
    let (CanonicalEntity::PublicationSeries(target), CanonicalEntity::PublicationSeries(source)) =
        (target, source)
    else {
        return 0;
    };
    let mut folded = target.title.absorb_missing(&source.title);
    if target.issn.is_none() && source.issn.is_some() {
        target.issn.clone_from(&source.issn);
        folded += 1;
    }
    if target.e_issn.is_none() && source.e_issn.is_some() {
        target.e_issn.clone_from(&source.e_issn);
        folded += 1;
    }
    folded
}
