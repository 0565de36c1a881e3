//! Conversion engine: harvested records → canonical entities in the store.
//!
//! A [`Converter`] lives for exactly one harvest run against one handler. It
//! works in two phases:
//!
//! 1. **Staging.** Each page of raw records is read and mapped to canonical
//!    DTOs (in parallel with `rayon`, keeping page order). Outgoing references
//!    stay as [`PendingLink`]s naming external ids. Per-record failures are
//!    collected, never raised.
//! 2. **Finalization** ([`Converter::finish`]).
//!    - `PartOf` cycles among the staged units (and the stored hierarchy they
//!      attach to) are detected; every member is skipped with
//!      [`ConversionError::CycleDetected`].
//!      Units already loaded keep their stored parent in the graph.
//!    - Survivors are upserted by `(handler, kind, external id)`. A record
//!      already loaded only gets its display fields refreshed; an unloaded one
//!      is replaced and records another import.
//!    - Pending links are resolved by the kind their reference names, through
//!      the run's [`ResolutionTable`] and then the store, and org-unit
//!      ancestor paths are recomputed.
//!
//! The result is a [`RunReport`].

mod hierarchy;
mod mapping;
mod resolution;

pub use hierarchy::{ancestor_path, is_ancestor, PartOfGraph};
pub use mapping::{is_series_type, normalize_doi, normalize_issn, to_canonical, Mapped};
pub use resolution::{check_target, PendingLink, ResolutionTable, UnresolvedLink, UnresolvedReason};

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cerif::harvested_record;
use crate::error::{ConversionError, Result, StoreError};
use crate::model::{
    CanonicalEntity, EntityId, EntityKind, HarvestedRecord, ImportProvenance, RunId, SourceKey,
    UserId,
};
use crate::multilingual::{LanguageTagRegistry, Normalizer};
use crate::oai::RawRecord;
use crate::report::{RunReport, RunStatus, SkippedRecord};
use crate::store::{EntityStore, StoredEntity};

/// A record waiting for finalization.
#[derive(Debug, Clone)]
struct Staged {
    mapped: Mapped,
}

/// Staging key: harvested kind and external id.
type StageKey = (EntityKind, String);

/// What the upsert did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Created,
    Updated,
    DisplayOnly,
}

/// Per-run conversion state.
///
/// # Examples
///
/// ```ignore
/// let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
/// converter.stage_page(page.records);
/// let report = converter.finish()?;
/// ```
#[derive(Debug)]
pub struct Converter<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    normalizer: Normalizer<'a, R>,
    handler: String,
    run: RunId,
    user: UserId,
    staged: IndexMap<StageKey, Staged>,
    skipped: Vec<SkippedRecord>,
    withdrawn: Vec<String>,
    pages: usize,
}

impl<'a, S, R> Converter<'a, S, R>
where
    S: EntityStore + ?Sized,
    R: LanguageTagRegistry + ?Sized,
{
    /// Starts a run for `handler` on behalf of `user`.
    pub fn new(store: &'a S, registry: &'a R, handler: impl Into<String>, user: UserId) -> Self {
        Self {
            store,
            normalizer: Normalizer::new(registry),
            handler: handler.into(),
            run: RunId::new(),
            user,
            staged: IndexMap::new(),
            skipped: Vec::new(),
            withdrawn: Vec::new(),
            pages: 0,
        }
    }

    /// Id of the run this converter belongs to.
    #[must_use]
    pub fn run(&self) -> RunId {
        self.run
    }

    /// Handler this run harvests.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Number of records currently staged.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Converts one harvested record without staging it.
    ///
    /// Returns `Ok(None)` for deleted records and payload-less headers.
    ///
    /// # Errors
    ///
    /// Returns the structural validation error of the payload.
    pub fn convert(&self, record: &HarvestedRecord) -> std::result::Result<Option<Mapped>, ConversionError> {
        match &record.entity {
            Some(entity) if !record.header.deleted => {
                entity.validate()?;
                Ok(Some(to_canonical(entity, &self.normalizer)))
            },
            _ => Ok(None),
        }
    }

    /// Reads, converts and stages one page of raw records.
    ///
    /// Records are converted in parallel; staging keeps page order, so a later
    /// record of the same kind and external id replaces the earlier one.
    pub fn stage_page(&mut self, records: Vec<RawRecord>) {
        self.pages += 1;
        let converted: Vec<Outcome> = {
            let this = &*self;
            records
                .into_par_iter()
                .map(|raw| {
                    let identifier = raw.header.identifier.clone();
                    match harvested_record(raw) {
                        Ok(record) => this.outcome(&record),
                        Err(err) => Outcome::Failed(identifier, err),
                    }
                })
                .collect()
        };
        debug!(handler = %self.handler, page = self.pages, records = converted.len(), "staging page");
        for outcome in converted {
            self.apply(outcome);
        }
    }

    /// Stages one already-read record.
    pub fn stage(&mut self, record: &HarvestedRecord) {
        let outcome = self.outcome(record);
        self.apply(outcome);
    }

    fn outcome(&self, record: &HarvestedRecord) -> Outcome {
        if record.header.deleted {
            return Outcome::Withdrawn(record.header.identifier.clone());
        }
        match self.convert(record) {
            Ok(Some(mapped)) => Outcome::Mapped(record.external_id().to_string(), mapped),
            Ok(None) => Outcome::Ignored,
            Err(err) => Outcome::Failed(record.external_id().to_string(), err),
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Mapped(external_id, mapped) => {
                self.staged
                    .insert((mapped.source_kind, external_id), Staged { mapped });
            },
            Outcome::Withdrawn(identifier) => self.withdrawn.push(identifier),
            Outcome::Failed(identifier, error) => {
                warn!(handler = %self.handler, record = %identifier, %error, "skipping record");
                self.skipped.push(SkippedRecord {
                    external_id: if error.external_id().is_empty() {
                        identifier
                    } else {
                        error.external_id().to_string()
                    },
                    error,
                });
            },
            Outcome::Ignored => {},
        }
    }

    /// Finalizes the run: cycle check, upsert, link resolution.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarvestError::Store`] when the store fails; records
    /// written before the failure stay written.
    pub fn finish(mut self) -> Result<RunReport> {
        let mut report = RunReport::new(self.run, &self.handler);
        report.pages = self.pages;
        report.skipped = std::mem::take(&mut self.skipped);
        report.withdrawn = std::mem::take(&mut self.withdrawn);

        for (external_id, chain) in self.cycle_members()? {
            if self.staged.shift_remove(&unit_key(&external_id)).is_some() {
                let error = ConversionError::CycleDetected {
                    external_id: external_id.clone(),
                    chain,
                };
                warn!(handler = %self.handler, record = %external_id, %error, "skipping record");
                report.skipped.push(SkippedRecord { external_id, error });
            }
        }

        let mut table = ResolutionTable::new();
        let mut persisted: Vec<(&StageKey, StoredEntity, bool)> = Vec::with_capacity(self.staged.len());
        for (key, staged) in &self.staged {
            let (stored, outcome) = match self.upsert(key, &staged.mapped.entity)? {
                Ok(done) => done,
                Err(error) => {
                    warn!(handler = %self.handler, record = %key.1, %error, "skipping record");
                    report.skipped.push(SkippedRecord {
                        external_id: key.1.clone(),
                        error,
                    });
                    continue;
                },
            };
            match outcome {
                Upsert::Created => report.created += 1,
                Upsert::Updated => report.updated += 1,
                Upsert::DisplayOnly => report.display_only += 1,
            }
            table.insert(key.1.clone(), stored.id, stored.kind());
            persisted.push((key, stored, outcome != Upsert::DisplayOnly));
        }

        let mut parents: HashMap<EntityId, Option<EntityId>> = HashMap::new();
        let mut dirty = Vec::new();
        for (index, (key, stored, relink)) in persisted.iter_mut().enumerate() {
            if !*relink {
                continue;
            }
            let external_id = &key.1;
            let links = &self.staged[*key].mapped.links;
            let mut changed = false;
            for link in links {
                match self.resolve(&table, link)? {
                    Ok(target) => changed |= stored.entity.link(link.slot, link.position, target),
                    Err(reason) => {
                        warn!(
                            handler = %self.handler,
                            record = %external_id,
                            slot = ?link.slot,
                            target = %link.target,
                            %reason,
                            "unresolved link"
                        );
                        report.unresolved.push(UnresolvedLink {
                            holder: external_id.clone(),
                            slot: link.slot,
                            target: link.target.clone(),
                            reason,
                        });
                    },
                }
            }
            if let CanonicalEntity::OrgUnit(unit) = &stored.entity {
                parents.insert(stored.id, unit.parent);
                dirty.push(index);
            } else if changed {
                dirty.push(index);
            }
        }

        for index in dirty {
            let stored = &mut persisted[index].1;
            if let CanonicalEntity::OrgUnit(unit) = &mut stored.entity {
                let store = self.store;
                unit.ancestors = ancestor_path(stored.id, |id| match parents.get(&id) {
                    Some(parent) => Ok(*parent),
                    None => Ok(store.find(id)?.and_then(|s| parent_of(&s.entity))),
                })?;
            }
            self.store.update(stored)?;
        }

        report.status = RunStatus::Completed;
        info!(
            handler = %self.handler,
            run = %self.run,
            created = report.created,
            updated = report.updated,
            display_only = report.display_only,
            skipped = report.skipped.len(),
            unresolved = report.unresolved.len(),
            "conversion finished"
        );
        Ok(report)
    }

    /// Creates, replaces or refreshes the stored record for a staging key.
    ///
    /// The inner error rejects a loaded record whose kind changed upstream;
    /// nothing is written for it.
    fn upsert(
        &self,
        (kind, external_id): &StageKey,
        entity: &CanonicalEntity,
    ) -> Result<std::result::Result<(StoredEntity, Upsert), ConversionError>> {
        let key = SourceKey::new(self.handler.clone(), *kind, external_id.clone());
        Ok(match self.store.find_by_source(&key)? {
            None => {
                let provenance = ImportProvenance::new(self.run, self.user);
                let id = self
                    .store
                    .insert(Some(key.clone()), entity.clone(), Some(provenance.clone()))?;
                Ok((
                    StoredEntity {
                        id,
                        source: Some(key),
                        entity: entity.clone(),
                        provenance: Some(provenance),
                    },
                    Upsert::Created,
                ))
            },
            Some(mut existing) if existing.is_loaded() => {
                if existing.entity.update_display_fields(entity) {
                    self.store.update(&existing)?;
                    Ok((existing, Upsert::DisplayOnly))
                } else {
                    Err(ConversionError::KindChanged {
                        external_id: external_id.clone(),
                        stored: existing.kind(),
                        harvested: entity.kind(),
                    })
                }
            },
            Some(mut existing) => {
                existing.entity = entity.clone();
                let provenance = existing
                    .provenance
                    .get_or_insert_with(|| ImportProvenance::new(self.run, self.user));
                provenance.record_import(self.run, self.user);
                self.store.update(&existing)?;
                Ok((existing, Upsert::Updated))
            },
        })
    }

    /// Resolves a pending link against this run, then against earlier runs.
    fn resolve(
        &self,
        table: &ResolutionTable,
        link: &PendingLink,
    ) -> Result<std::result::Result<EntityId, UnresolvedReason>> {
        let found = match table.get(link) {
            Some(hit) => Some(hit),
            None => self
                .store
                .find_by_source(&SourceKey::new(self.handler.clone(), link.kind, link.target.clone()))?
                .map(|stored| (stored.id, stored.kind())),
        };
        Ok(match found {
            None => Err(UnresolvedReason::NotFound),
            Some((id, kind)) => check_target(link.slot, kind).map(|()| id),
        })
    }

    /// Cycle members to skip among the staged org units, including cycles
    /// closed through units stored by earlier runs.
    ///
    /// A loaded unit only gets display fields, so its stored parent stands in
    /// for the harvested one and it is never skipped itself.
    fn cycle_members(&self) -> Result<IndexMap<String, Vec<String>>> {
        let mut graph = PartOfGraph::new();
        let mut loaded = HashSet::new();
        let mut starts = Vec::new();
        for ((kind, external_id), staged) in &self.staged {
            if *kind != EntityKind::OrgUnit {
                continue;
            }
            if self.find_unit(external_id)?.is_some_and(|s| s.is_loaded()) {
                loaded.insert(external_id.clone());
                starts.push(external_id.clone());
            } else if let Some(parent) = &staged.mapped.part_of {
                graph.add_edge(external_id.clone(), parent.clone());
                if !self.staged.contains_key(&unit_key(parent)) {
                    starts.push(parent.clone());
                }
            }
        }
        for start in starts {
            self.extend_with_stored(&mut graph, start)?;
        }
        let mut members = graph.cycle_members();
        members.retain(|external_id, _| !loaded.contains(external_id));
        Ok(members)
    }

    fn find_unit(&self, external_id: &str) -> Result<Option<StoredEntity>> {
        Ok(self
            .store
            .find_by_source(&SourceKey::new(self.handler.clone(), EntityKind::OrgUnit, external_id))?)
    }

    /// Follows the stored parents of `node` until a root, a staged unit, or an
    /// already known node.
    fn extend_with_stored(&self, graph: &mut PartOfGraph, node: String) -> Result<()> {
        let mut current = self.find_unit(&node)?;
        let mut name = node;
        while let Some(stored) = current {
            if graph.has_parent(&name) {
                break;
            }
            let Some(parent_id) = parent_of(&stored.entity) else {
                break;
            };
            let Some(parent) = self.store.find(parent_id)? else {
                break;
            };
            let parent_name = self.node_name(&parent);
            graph.add_edge(name, parent_name.clone());
            if self.staged.contains_key(&unit_key(&parent_name)) {
                break;
            }
            name = parent_name;
            current = Some(parent);
        }
        Ok(())
    }

    /// Graph node name of a stored unit: its external id when it came from
    /// this handler, its store id otherwise.
    fn node_name(&self, stored: &StoredEntity) -> String {
        match &stored.source {
            Some(key) if key.handler == self.handler => key.external_id.clone(),
            _ => stored.id.to_string(),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Mapped(String, Mapped),
    Withdrawn(String),
    Failed(String, ConversionError),
    Ignored,
}

fn unit_key(external_id: &str) -> StageKey {
    (EntityKind::OrgUnit, external_id.to_string())
}

fn parent_of(entity: &CanonicalEntity) -> Option<EntityId> {
    match entity {
        CanonicalEntity::OrgUnit(unit) => unit.parent,
        _ => None,
    }
}

/// Marks every record last imported by `run` as loaded.
///
/// Returns the number of records that changed.
///
/// # Errors
///
/// Returns [`crate::HarvestError::Store`] when the store fails.
pub fn commit_run<S: EntityStore + ?Sized>(store: &S, run: RunId) -> Result<usize> {
    let mut committed = 0;
    for mut stored in store.list_by_run(run)? {
        if let Some(provenance) = stored.provenance.as_mut() {
            if !provenance.loaded {
                provenance.mark_loaded();
                store.update(&stored)?;
                committed += 1;
            }
        }
    }
    info!(%run, committed, "run committed");
    Ok(committed)
}

/// Clears the `loaded` flag of one record so the next harvest replaces it.
///
/// Returns false when the record was not loaded or has no provenance.
///
/// # Errors
///
/// Returns [`crate::HarvestError::Store`] with [`StoreError::NotFound`] for an
/// unknown id.
pub fn reopen<S: EntityStore + ?Sized>(store: &S, id: EntityId) -> Result<bool> {
    let mut stored = store.find(id)?.ok_or(StoreError::NotFound(id))?;
    let Some(provenance) = stored.provenance.as_mut() else {
        return Ok(false);
    };
    if !provenance.loaded {
        return Ok(false);
    }
    provenance.reopen();
    store.update(&stored)?;
    info!(%id, "record re-opened");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, RecordHeader};
    use crate::multilingual::InMemoryLanguageTagRegistry;
    use crate::store::InMemoryStore;
    use crate::xml::parse_document;

    fn raw(identifier: &str, xml: &str) -> RawRecord {
        RawRecord {
            header: RecordHeader {
                identifier: identifier.to_string(),
                ..Default::default()
            },
            metadata: Some(parse_document(xml).unwrap()),
        }
    }

    fn unit(id: &str, parent: Option<&str>) -> RawRecord {
        let part_of = parent.map_or_else(String::new, |p| {
            format!(r#"<PartOf><OrgUnit id="{p}"/></PartOf>"#)
        });
        raw(
            &format!("oai:repoX:OrgUnits/{id}"),
            &format!(r#"<OrgUnit id="{id}"><Name lang="en">Unit {id}</Name>{part_of}</OrgUnit>"#),
        )
    }

    fn registry() -> InMemoryLanguageTagRegistry {
        InMemoryLanguageTagRegistry::from_codes(["EN", "SR"])
    }

    #[test]
    fn test_links_resolve_across_pages() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
        converter.stage_page(vec![unit("uni", None)]);
        converter.stage_page(vec![unit("fac", Some("uni")), unit("dept", Some("fac"))]);
        let report = converter.finish().unwrap();
        assert_eq!(report.created, 3);
        assert!(report.unresolved.is_empty());

        let dept = store
            .find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "dept"))
            .unwrap()
            .unwrap();
        let fac = store.find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "fac")).unwrap().unwrap();
        let uni = store.find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "uni")).unwrap().unwrap();
        match dept.entity {
            CanonicalEntity::OrgUnit(u) => {
                assert_eq!(u.parent, Some(fac.id));
                assert_eq!(u.ancestors, vec![fac.id, uni.id]);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cycle_members_are_skipped() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
        converter.stage_page(vec![unit("A", Some("B")), unit("B", Some("A")), unit("C", None)]);
        let report = converter.finish().unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|s| s.error.is_cycle()));
        assert_eq!(report.status, RunStatus::Completed);
    }

    #[test]
    fn test_cycle_through_stored_hierarchy() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut first = Converter::new(&store, &registry, "repoX", UserId(1));
        first.stage_page(vec![unit("A", None), unit("B", Some("A"))]);
        first.finish().unwrap();

        let mut second = Converter::new(&store, &registry, "repoX", UserId(1));
        second.stage_page(vec![unit("A", Some("B"))]);
        let report = second.finish().unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].error,
            ConversionError::CycleDetected {
                external_id: "A".to_string(),
                chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
            }
        );
    }

    #[test]
    fn test_references_resolve_by_named_kind() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
        converter.stage_page(vec![
            unit("o1", None),
            raw(
                "oai:repoX:Products/prod1",
                r#"<Product id="prod1"><Name lang="en">Data</Name>
                   <Creators><Creator><Person id="o1"/></Creator><Creator><Person id="ghost"/></Creator></Creators>
                 </Product>"#,
            ),
        ]);
        let report = converter.finish().unwrap();
        assert_eq!(report.unresolved.len(), 2);
        assert!(report
            .unresolved
            .iter()
            .all(|u| u.reason == UnresolvedReason::NotFound));
    }

    #[test]
    fn test_same_id_different_kinds_are_separate_records() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
        converter.stage_page(vec![
            raw(
                "oai:repoX:Persons/1",
                r#"<Person id="1"><PersonName><FamilyName>Petrović</FamilyName></PersonName>
                   <Affiliation><OrgUnit id="1"/></Affiliation></Person>"#,
            ),
            unit("1", None),
            raw(
                "oai:repoX:Products/1",
                r#"<Product id="1"><Name lang="en">Data</Name>
                   <Creators><Creator><Person id="1"/></Creator></Creators></Product>"#,
            ),
        ]);
        let report = converter.finish().unwrap();
        assert_eq!(report.created, 3);
        assert!(report.unresolved.is_empty());
        assert_eq!(store.len().unwrap(), 3);

        let find = |kind| {
            store
                .find_by_source(&SourceKey::new("repoX", kind, "1"))
                .unwrap()
                .unwrap()
        };
        let (person, org_unit, product) = (
            find(EntityKind::Person),
            find(EntityKind::OrgUnit),
            find(EntityKind::Product),
        );
        assert_eq!(person.kind(), EntityKind::Person);
        assert_eq!(org_unit.kind(), EntityKind::OrgUnit);
        match (&person.entity, &product.entity) {
            (CanonicalEntity::Person(p), CanonicalEntity::Product(d)) => {
                assert_eq!(p.affiliations, vec![org_unit.id]);
                assert_eq!(d.creators[0].person, Some(person.id));
            },
            other => panic!("unexpected {other:?}"),
        }

        let mut again = Converter::new(&store, &registry, "repoX", UserId(1));
        again.stage_page(vec![unit("1", None)]);
        let report = again.finish().unwrap();
        assert_eq!((report.created, report.updated), (0, 1));
        assert_eq!(find(EntityKind::Person).kind(), EntityKind::Person);
    }

    #[test]
    fn test_loaded_series_harvested_as_article_is_skipped() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut first = Converter::new(&store, &registry, "repoX", UserId(1));
        let run = first.run();
        first.stage_page(vec![raw(
            "oai:repoX:Publications/j1",
            r#"<Publication id="j1"><Type>http://purl.org/coar/resource_type/c_0640</Type>
               <Title lang="en">Journal</Title></Publication>"#,
        )]);
        first.finish().unwrap();
        commit_run(&store, run).unwrap();
        let writes = store.writes();

        let mut second = Converter::new(&store, &registry, "repoX", UserId(1));
        second.stage_page(vec![raw(
            "oai:repoX:Publications/j1",
            r#"<Publication id="j1"><Title lang="en">Journal</Title></Publication>"#,
        )]);
        let report = second.finish().unwrap();
        assert_eq!(report.display_only, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].error,
            ConversionError::KindChanged {
                external_id: "j1".to_string(),
                stored: EntityKind::PublicationSeries,
                harvested: EntityKind::Publication,
            }
        );
        assert_eq!(store.writes(), writes);
    }

    #[test]
    fn test_deleted_and_malformed_records_are_reported() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut converter = Converter::new(&store, &registry, "repoX", UserId(1));
        let deleted = RawRecord {
            header: RecordHeader {
                identifier: "oai:repoX:Persons/gone".to_string(),
                deleted: true,
                ..Default::default()
            },
            metadata: None,
        };
        converter.stage_page(vec![deleted, raw("oai:repoX:Persons/p9", r#"<Person id="p9"/>"#)]);
        let report = converter.finish().unwrap();
        assert_eq!(report.withdrawn, vec!["oai:repoX:Persons/gone"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].external_id, "p9");
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn test_loaded_record_gets_display_fields_only() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut first = Converter::new(&store, &registry, "repoX", UserId(1));
        let run = first.run();
        first.stage_page(vec![unit("uni", None), unit("fac", Some("uni"))]);
        first.finish().unwrap();
        assert_eq!(commit_run(&store, run).unwrap(), 2);

        let mut second = Converter::new(&store, &registry, "repoX", UserId(2));
        second.stage_page(vec![raw(
            "oai:repoX:OrgUnits/fac",
            r#"<OrgUnit id="fac"><Name lang="en">Renamed</Name></OrgUnit>"#,
        )]);
        let report = second.finish().unwrap();
        assert_eq!(report.display_only, 1);

        let fac = store.find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "fac")).unwrap().unwrap();
        let provenance = fac.provenance.clone().unwrap();
        assert_eq!(provenance.run, run);
        assert_eq!(provenance.importing_users.len(), 1);
        match fac.entity {
            CanonicalEntity::OrgUnit(u) => {
                assert_eq!(u.name.text_for("EN"), Some("Renamed"));
                assert!(u.parent.is_some());
            },
            other => panic!("unexpected {other:?}"),
        }

        assert!(reopen(&store, fac.id).unwrap());
        assert!(!reopen(&store, fac.id).unwrap());
    }

    #[test]
    fn test_loaded_unit_keeps_display_refresh_despite_upstream_cycle() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut first = Converter::new(&store, &registry, "repoX", UserId(1));
        let run = first.run();
        first.stage_page(vec![unit("A", None), unit("B", Some("A"))]);
        first.finish().unwrap();
        commit_run(&store, run).unwrap();

        let mut second = Converter::new(&store, &registry, "repoX", UserId(1));
        second.stage_page(vec![raw(
            "oai:repoX:OrgUnits/A",
            r#"<OrgUnit id="A"><Name lang="en">Renamed</Name><PartOf><OrgUnit id="B"/></PartOf></OrgUnit>"#,
        )]);
        let report = second.finish().unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(report.display_only, 1);

        let a = store
            .find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "A"))
            .unwrap()
            .unwrap();
        match a.entity {
            CanonicalEntity::OrgUnit(u) => {
                assert_eq!(u.name.text_for("EN"), Some("Renamed"));
                assert_eq!(u.parent, None);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cycle_through_loaded_unit_skips_only_unloaded_members() {
        let store = InMemoryStore::new();
        let registry = registry();
        let mut first = Converter::new(&store, &registry, "repoX", UserId(1));
        let run = first.run();
        first.stage_page(vec![unit("A", None), unit("B", Some("A"))]);
        first.finish().unwrap();
        commit_run(&store, run).unwrap();
        let a = store
            .find_by_source(&SourceKey::new("repoX", EntityKind::OrgUnit, "A"))
            .unwrap()
            .unwrap();
        assert!(reopen(&store, a.id).unwrap());

        let mut second = Converter::new(&store, &registry, "repoX", UserId(1));
        second.stage_page(vec![unit("A", Some("B")), unit("B", Some("A"))]);
        let report = second.finish().unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].external_id, "A");
        assert!(report.skipped[0].error.is_cycle());
        assert_eq!(report.display_only, 1);
    }

    #[test]
    fn test_reopen_unknown_id() {
        let store = InMemoryStore::new();
        assert!(reopen(&store, EntityId(99)).is_err());
    }
}
