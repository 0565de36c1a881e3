//! Import provenance attached to every harvested canonical record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::RunId;

/// Identifier of the user on whose behalf a harvest ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Who imported a record, from which run, and whether it has been committed.
///
/// A `loaded` record has been committed into the canonical store. Re-harvests
/// of a loaded record only refresh its display fields; the provenance stays as
/// it is until the record is explicitly [re-opened](Self::reopen).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProvenance {
    /// Users whose harvests produced this record.
    pub importing_users: BTreeSet<UserId>,
    /// Whether the record has been committed.
    pub loaded: bool,
    /// Run that last (re)imported the record.
    pub run: RunId,
}

impl ImportProvenance {
    /// Provenance of a record first seen in `run` by `user`.
    #[must_use]
    pub fn new(run: RunId, user: UserId) -> Self {
        Self {
            importing_users: BTreeSet::from([user]),
            loaded: false,
            run,
        }
    }

    /// Records another import of an unloaded record.
    ///
    /// Returns false (and changes nothing) when the record is loaded.
    pub fn record_import(&mut self, run: RunId, user: UserId) -> bool {
        if self.loaded {
            return false;
        }
        self.importing_users.insert(user);
        self.run = run;
        true
    }

    /// Marks the record as committed.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Re-opens a committed record so the next harvest may replace it.
    pub fn reopen(&mut self) {
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_import_accumulates_users() {
        let first = RunId::new();
        let second = RunId::new();
        let mut provenance = ImportProvenance::new(first, UserId(1));
        assert!(provenance.record_import(second, UserId(2)));
        assert_eq!(provenance.importing_users.len(), 2);
        assert_eq!(provenance.run, second);
    }

    #[test]
    fn test_loaded_import_is_frozen() {
        let first = RunId::new();
        let mut provenance = ImportProvenance::new(first, UserId(1));
        provenance.mark_loaded();
        assert!(!provenance.record_import(RunId::new(), UserId(2)));
        assert_eq!(provenance.run, first);
        assert_eq!(provenance.importing_users.len(), 1);

        provenance.reopen();
        assert!(provenance.record_import(RunId::new(), UserId(2)));
    }
}
