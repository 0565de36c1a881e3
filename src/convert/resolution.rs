//! Per-run pending-link table.
//!
//! References between harvested records are written as external ids. During
//! a run every staged record keeps its outgoing references as
//! [`PendingLink`]s; once the run's records have store ids, the
//! [`ResolutionTable`] maps `(kind, external id)` to ids and the links are
//! filled in.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{EntityId, EntityKind, ReferenceSlot};

/// An outgoing reference that still names its target by external id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingLink {
    /// Slot to fill.
    pub slot: ReferenceSlot,
    /// Contributor position for contributor slots, 0 otherwise.
    pub position: usize,
    /// Harvested kind the reference element names.
    pub kind: EntityKind,
    /// External id of the target record.
    pub target: String,
}

impl PendingLink {
    /// Link from `slot` to the record of the slot's harvested kind with id `target`.
    pub fn new(slot: ReferenceSlot, position: usize, target: impl Into<String>) -> Self {
        Self {
            slot,
            position,
            kind: slot.harvested_target(),
            target: target.into(),
        }
    }
}

/// Why a link could not be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// No record with the target id was seen in this run or stored earlier.
    NotFound,
    /// The target exists but its kind cannot fill the slot.
    WrongKind(EntityKind),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("target not found"),
            Self::WrongKind(kind) => write!(f, "target is a {kind}"),
        }
    }
}

/// A link left empty at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLink {
    /// External id of the record holding the reference.
    pub holder: String,
    /// Slot that stayed empty.
    pub slot: ReferenceSlot,
    /// External id the reference named.
    pub target: String,
    /// Why it stayed empty.
    pub reason: UnresolvedReason,
}

/// `(harvested kind, external id)` → (store id, canonical kind) for the
/// records of one run.
#[derive(Debug, Clone, Default)]
pub struct ResolutionTable {
    entries: IndexMap<(EntityKind, String), (EntityId, EntityKind)>,
}

impl ResolutionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a persisted record under its harvested kind.
    pub fn insert(&mut self, external_id: impl Into<String>, id: EntityId, kind: EntityKind) {
        self.entries
            .insert((kind.harvested(), external_id.into()), (id, kind));
    }

    /// Looks up the record of this run a link points at.
    #[must_use]
    pub fn get(&self, link: &PendingLink) -> Option<(EntityId, EntityKind)> {
        self.entries
            .get(&(link.kind.harvested(), link.target.clone()))
            .copied()
    }

    /// External id registered for a store id.
    #[must_use]
    pub fn external_id_of(&self, id: EntityId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, (entry_id, _))| *entry_id == id)
            .map(|((_, external_id), _)| external_id.as_str())
    }

    /// Number of registered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no record is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checks that `kind` may fill `slot`.
///
/// # Errors
///
/// Returns [`UnresolvedReason::WrongKind`] otherwise.
pub fn check_target(slot: ReferenceSlot, kind: EntityKind) -> Result<(), UnresolvedReason> {
    if slot.accepts(kind) {
        Ok(())
    } else {
        Err(UnresolvedReason::WrongKind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let mut table = ResolutionTable::new();
        table.insert("p1", EntityId(1), EntityKind::Person);
        let author = PendingLink::new(ReferenceSlot::Author, 0, "p1");
        assert_eq!(table.get(&author), Some((EntityId(1), EntityKind::Person)));
        assert_eq!(table.get(&PendingLink::new(ReferenceSlot::Author, 0, "p2")), None);
        assert_eq!(table.external_id_of(EntityId(1)), Some("p1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_table_keys_by_kind() {
        let mut table = ResolutionTable::new();
        table.insert("1", EntityId(1), EntityKind::Person);
        table.insert("1", EntityId(2), EntityKind::OrgUnit);
        table.insert("j1", EntityId(3), EntityKind::PublicationSeries);
        assert_eq!(table.len(), 3);

        let creator = PendingLink::new(ReferenceSlot::Creator, 0, "1");
        let affiliation = PendingLink::new(ReferenceSlot::Affiliation, 0, "1");
        let venue = PendingLink::new(ReferenceSlot::PublishedIn, 0, "j1");
        assert_eq!(creator.kind, EntityKind::Person);
        assert_eq!(table.get(&creator), Some((EntityId(1), EntityKind::Person)));
        assert_eq!(table.get(&affiliation), Some((EntityId(2), EntityKind::OrgUnit)));
        assert_eq!(table.get(&venue), Some((EntityId(3), EntityKind::PublicationSeries)));
    }

    #[test]
    fn test_check_target() {
        assert!(check_target(ReferenceSlot::Creator, EntityKind::Person).is_ok());
        assert_eq!(
            check_target(ReferenceSlot::Creator, EntityKind::OrgUnit),
            Err(UnresolvedReason::WrongKind(EntityKind::OrgUnit))
        );
        assert_eq!(
            UnresolvedReason::WrongKind(EntityKind::OrgUnit).to_string(),
            "target is a OrgUnit"
        );
    }
}
