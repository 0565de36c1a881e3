//! Canonical (dialect independent) DTOs.
//!
//! Every free-text field is a [`MultilingualContent`] produced by the
//! normalizer. References to other entities are [`EntityId`]s; they are filled
//! in by the conversion engine once the referenced record has an id, and
//! rewritten by the merge engine.

use serde::{Deserialize, Serialize};

use crate::model::{EntityId, EntityKind};
use crate::multilingual::MultilingualContent;

/// A reference slot an entity can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceSlot {
    /// Person → organisation unit.
    Affiliation,
    /// Organisation unit → parent organisation unit.
    PartOf,
    /// Organisation unit → any ancestor on its stored ancestor path.
    Ancestor,
    /// Publication → author person.
    Author,
    /// Publication → editor person.
    Editor,
    /// Product → creator person.
    Creator,
    /// Patent → inventor person.
    Inventor,
    /// Patent → holder organisation unit.
    Holder,
    /// Publication → containing series or publication.
    PublishedIn,
}

impl ReferenceSlot {
    /// Whether an entity of `kind` may be the target of this slot.
    #[must_use]
    pub fn accepts(self, kind: EntityKind) -> bool {
        match self {
            Self::Affiliation | Self::PartOf | Self::Ancestor | Self::Holder => {
                kind == EntityKind::OrgUnit
            },
            Self::Author | Self::Editor | Self::Creator | Self::Inventor => {
                kind == EntityKind::Person
            },
            Self::PublishedIn => {
                matches!(kind, EntityKind::PublicationSeries | EntityKind::Publication)
            },
        }
    }

    /// Harvested kind of the record a reference in this slot names.
    #[must_use]
    pub fn harvested_target(self) -> EntityKind {
        match self {
            Self::Affiliation | Self::PartOf | Self::Ancestor | Self::Holder => EntityKind::OrgUnit,
            Self::Author | Self::Editor | Self::Creator | Self::Inventor => EntityKind::Person,
            Self::PublishedIn => EntityKind::Publication,
        }
    }
}

/// Named contributor, optionally linked to a canonical person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// Name as printed on the work.
    pub display_name: Option<String>,
    /// Linked person.
    pub person: Option<EntityId>,
}

/// Canonical person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDto {
    /// First names.
    pub first_name: Option<String>,
    /// Family names.
    pub last_name: Option<String>,
    /// ORCID iD.
    pub orcid: Option<String>,
    /// E-mail addresses.
    pub emails: Vec<String>,
    /// Research keywords.
    pub keywords: MultilingualContent,
    /// Affiliated organisation units.
    pub affiliations: Vec<EntityId>,
}

/// Canonical organisation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUnitDto {
    /// Name.
    pub name: MultilingualContent,
    /// Acronym.
    pub acronym: Option<String>,
    /// Organisation type.
    pub org_type: Option<String>,
    /// Direct parent.
    pub parent: Option<EntityId>,
    /// Ancestors, nearest first.
    pub ancestors: Vec<EntityId>,
}

/// Canonical event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDto {
    /// Name.
    pub name: MultilingualContent,
    /// Acronym.
    pub acronym: Option<String>,
    /// Place.
    pub place: Option<String>,
    /// Country code.
    pub country: Option<String>,
    /// Start date.
    pub start_date: Option<String>,
    /// End date.
    pub end_date: Option<String>,
    /// Description.
    pub description: MultilingualContent,
    /// Keywords.
    pub keywords: MultilingualContent,
}

/// Canonical research product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDto {
    /// Name.
    pub name: MultilingualContent,
    /// Description.
    pub description: MultilingualContent,
    /// Product type.
    pub product_type: Option<String>,
    /// Landing page.
    pub url: Option<String>,
    /// Keywords.
    pub keywords: MultilingualContent,
    /// Creators in source order.
    pub creators: Vec<Contributor>,
}

/// Canonical patent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatentDto {
    /// Title.
    pub title: MultilingualContent,
    /// Abstract.
    pub description: MultilingualContent,
    /// Patent number.
    pub patent_number: Option<String>,
    /// Registration date.
    pub registration_date: Option<String>,
    /// Inventors in source order.
    pub inventors: Vec<Contributor>,
    /// Holder organisation units.
    pub holders: Vec<EntityId>,
}

/// Canonical publication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationDto {
    /// COAR resource type.
    pub publication_type: Option<String>,
    /// Title.
    pub title: MultilingualContent,
    /// Subtitle.
    pub subtitle: MultilingualContent,
    /// Abstract.
    pub description: MultilingualContent,
    /// Keywords.
    pub keywords: MultilingualContent,
    /// Authors in source order.
    pub authors: Vec<Contributor>,
    /// Editors in source order.
    pub editors: Vec<Contributor>,
    /// Containing series or publication.
    pub published_in: Option<EntityId>,
    /// DOI, lowercased without resolver prefix.
    pub doi: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Publication date.
    pub publication_date: Option<String>,
    /// Volume.
    pub volume: Option<String>,
    /// Issue.
    pub issue: Option<String>,
    /// First page.
    pub start_page: Option<String>,
    /// Last page.
    pub end_page: Option<String>,
}

/// Canonical journal or other publication series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationSeriesDto {
    /// Title.
    pub title: MultilingualContent,
    /// Print ISSN, `NNNN-NNNC` form.
    pub issn: Option<String>,
    /// Electronic ISSN, `NNNN-NNNC` form.
    pub e_issn: Option<String>,
}

/// Sum type over canonical entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CanonicalEntity {
    /// Person.
    Person(PersonDto),
    /// Organisation unit.
    OrgUnit(OrganisationUnitDto),
    /// Event.
    Event(EventDto),
    /// Product.
    Product(ProductDto),
    /// Patent.
    Patent(PatentDto),
    /// Publication.
    Publication(PublicationDto),
    /// Journal or series.
    PublicationSeries(PublicationSeriesDto),
}

/// Directed part-of edge between two organisation units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganisationUnitRelation {
    /// The unit that belongs to `target`.
    pub source: EntityId,
    /// The parent unit.
    pub target: EntityId,
}

impl CanonicalEntity {
    /// Kind of the entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Person(_) => EntityKind::Person,
            Self::OrgUnit(_) => EntityKind::OrgUnit,
            Self::Event(_) => EntityKind::Event,
            Self::Product(_) => EntityKind::Product,
            Self::Patent(_) => EntityKind::Patent,
            Self::Publication(_) => EntityKind::Publication,
            Self::PublicationSeries(_) => EntityKind::PublicationSeries,
        }
    }

    /// Human readable label used in logs and duplicate detection.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Person(p) => match (&p.last_name, &p.first_name) {
                (Some(last), Some(first)) => Some(format!("{last}, {first}")),
                (Some(name), None) | (None, Some(name)) => Some(name.clone()),
                (None, None) => None,
            },
            Self::OrgUnit(o) => o.name.preferred().map(str::to_string),
            Self::Event(e) => e.name.preferred().map(str::to_string),
            Self::Product(p) => p.name.preferred().map(str::to_string),
            Self::Patent(p) => p.title.preferred().map(str::to_string),
            Self::Publication(p) => p.title.preferred().map(str::to_string),
            Self::PublicationSeries(s) => s.title.preferred().map(str::to_string),
        }
    }

    /// All outgoing references.
    #[must_use]
    pub fn references(&self) -> Vec<(ReferenceSlot, EntityId)> {
        let mut refs = Vec::new();
        match self {
            Self::Person(p) => {
                refs.extend(p.affiliations.iter().map(|id| (ReferenceSlot::Affiliation, *id)));
            },
            Self::OrgUnit(o) => {
                refs.extend(o.parent.map(|id| (ReferenceSlot::PartOf, id)));
                refs.extend(o.ancestors.iter().map(|id| (ReferenceSlot::Ancestor, *id)));
            },
            Self::Event(_) | Self::PublicationSeries(_) => {},
            Self::Product(p) => contributor_refs(&mut refs, ReferenceSlot::Creator, &p.creators),
            Self::Patent(p) => {
                contributor_refs(&mut refs, ReferenceSlot::Inventor, &p.inventors);
                refs.extend(p.holders.iter().map(|id| (ReferenceSlot::Holder, *id)));
            },
            Self::Publication(p) => {
                contributor_refs(&mut refs, ReferenceSlot::Author, &p.authors);
                contributor_refs(&mut refs, ReferenceSlot::Editor, &p.editors);
                refs.extend(p.published_in.map(|id| (ReferenceSlot::PublishedIn, id)));
            },
        }
        refs
    }

    /// Fills a reference slot.
    ///
    /// `position` addresses the contributor for contributor slots and is
    /// ignored elsewhere; list slots append, single slots overwrite.
    /// Returns false when this entity has no such slot.
    pub fn link(&mut self, slot: ReferenceSlot, position: usize, target: EntityId) -> bool {
        match (self, slot) {
            (Self::Person(p), ReferenceSlot::Affiliation) => push_unique(&mut p.affiliations, target),
            (Self::OrgUnit(o), ReferenceSlot::PartOf) => {
                o.parent = Some(target);
                true
            },
            (Self::OrgUnit(o), ReferenceSlot::Ancestor) => push_unique(&mut o.ancestors, target),
            (Self::Product(p), ReferenceSlot::Creator) => link_contributor(&mut p.creators, position, target),
            (Self::Patent(p), ReferenceSlot::Inventor) => link_contributor(&mut p.inventors, position, target),
            (Self::Patent(p), ReferenceSlot::Holder) => push_unique(&mut p.holders, target),
            (Self::Publication(p), ReferenceSlot::Author) => link_contributor(&mut p.authors, position, target),
            (Self::Publication(p), ReferenceSlot::Editor) => link_contributor(&mut p.editors, position, target),
            (Self::Publication(p), ReferenceSlot::PublishedIn) => {
                p.published_in = Some(target);
                true
            },
            _ => false,
        }
    }

    /// Replaces every reference to `from` in `slot` with `to`.
    ///
    /// Returns the number of replaced references.
    pub fn repoint(&mut self, slot: ReferenceSlot, from: EntityId, to: EntityId) -> usize {
        match (self, slot) {
            (Self::Person(p), ReferenceSlot::Affiliation) => replace_ids(&mut p.affiliations, from, to),
            (Self::OrgUnit(o), ReferenceSlot::PartOf) => replace_option(&mut o.parent, from, to),
            (Self::OrgUnit(o), ReferenceSlot::Ancestor) => replace_ids(&mut o.ancestors, from, to),
            (Self::Product(p), ReferenceSlot::Creator) => replace_contributors(&mut p.creators, from, to),
            (Self::Patent(p), ReferenceSlot::Inventor) => replace_contributors(&mut p.inventors, from, to),
            (Self::Patent(p), ReferenceSlot::Holder) => replace_ids(&mut p.holders, from, to),
            (Self::Publication(p), ReferenceSlot::Author) => replace_contributors(&mut p.authors, from, to),
            (Self::Publication(p), ReferenceSlot::Editor) => replace_contributors(&mut p.editors, from, to),
            (Self::Publication(p), ReferenceSlot::PublishedIn) => {
                replace_option(&mut p.published_in, from, to)
            },
            _ => 0,
        }
    }

    /// Copies the display fields (name, description) of `incoming` onto self.
    ///
    /// Identity, identifiers and references are left alone. Returns false when
    /// the kinds differ and nothing was copied.
    pub fn update_display_fields(&mut self, incoming: &CanonicalEntity) -> bool {
        match (self, incoming) {
            (Self::Person(current), Self::Person(new)) => {
                current.first_name.clone_from(&new.first_name);
                current.last_name.clone_from(&new.last_name);
            },
            (Self::OrgUnit(current), Self::OrgUnit(new)) => {
                current.name = new.name.clone();
            },
            (Self::Event(current), Self::Event(new)) => {
                current.name = new.name.clone();
                current.description = new.description.clone();
            },
            (Self::Product(current), Self::Product(new)) => {
                current.name = new.name.clone();
                current.description = new.description.clone();
            },
            (Self::Patent(current), Self::Patent(new)) => {
                current.title = new.title.clone();
                current.description = new.description.clone();
            },
            (Self::Publication(current), Self::Publication(new)) => {
                current.title = new.title.clone();
                current.subtitle = new.subtitle.clone();
                current.description = new.description.clone();
            },
            (Self::PublicationSeries(current), Self::PublicationSeries(new)) => {
                current.title = new.title.clone();
            },
            _ => return false,
        }
        true
    }

    /// Part-of edge of an organisation unit stored under `id`.
    #[must_use]
    pub fn org_unit_relation(&self, id: EntityId) -> Option<OrganisationUnitRelation> {
        match self {
            Self::OrgUnit(OrganisationUnitDto {
                parent: Some(parent),
                ..
            }) => Some(OrganisationUnitRelation {
                source: id,
                target: *parent,
            }),
            _ => None,
        }
    }
}

fn contributor_refs(
    refs: &mut Vec<(ReferenceSlot, EntityId)>,
    slot: ReferenceSlot,
    contributors: &[Contributor],
) {
    refs.extend(contributors.iter().filter_map(|c| c.person).map(|id| (slot, id)));
}

fn push_unique(ids: &mut Vec<EntityId>, id: EntityId) -> bool {
    if !ids.contains(&id) {
        ids.push(id);
    }
    true
}

fn link_contributor(contributors: &mut [Contributor], position: usize, target: EntityId) -> bool {
    match contributors.get_mut(position) {
        Some(contributor) => {
            contributor.person = Some(target);
            true
        },
        None => false,
    }
}

fn replace_ids(ids: &mut [EntityId], from: EntityId, to: EntityId) -> usize {
    let mut count = 0;
    for id in ids.iter_mut().filter(|id| **id == from) {
        *id = to;
        count += 1;
    }
    count
}

fn replace_option(slot: &mut Option<EntityId>, from: EntityId, to: EntityId) -> usize {
    match slot {
        Some(id) if *id == from => {
            *id = to;
            1
        },
        _ => 0,
    }
}

fn replace_contributors(contributors: &mut [Contributor], from: EntityId, to: EntityId) -> usize {
    let mut count = 0;
    for person in contributors
        .iter_mut()
        .filter_map(|c| c.person.as_mut())
        .filter(|person| **person == from)
    {
        *person = to;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(venue: Option<EntityId>) -> CanonicalEntity {
        CanonicalEntity::Publication(PublicationDto {
            authors: vec![
                Contributor {
                    display_name: Some("Ann".to_string()),
                    person: Some(EntityId(1)),
                },
                Contributor {
                    display_name: Some("Bob".to_string()),
                    person: None,
                },
            ],
            published_in: venue,
            ..Default::default()
        })
    }

    #[test]
    fn test_slot_harvested_target() {
        assert_eq!(ReferenceSlot::Creator.harvested_target(), EntityKind::Person);
        assert_eq!(ReferenceSlot::Holder.harvested_target(), EntityKind::OrgUnit);
        assert_eq!(ReferenceSlot::PublishedIn.harvested_target(), EntityKind::Publication);
        assert!(ReferenceSlot::PublishedIn.accepts(ReferenceSlot::PublishedIn.harvested_target()));
    }

    #[test]
    fn test_slot_accepts_kinds() {
        assert!(ReferenceSlot::PartOf.accepts(EntityKind::OrgUnit));
        assert!(!ReferenceSlot::PartOf.accepts(EntityKind::Person));
        assert!(ReferenceSlot::PublishedIn.accepts(EntityKind::PublicationSeries));
        assert!(ReferenceSlot::PublishedIn.accepts(EntityKind::Publication));
        assert!(!ReferenceSlot::Creator.accepts(EntityKind::OrgUnit));
    }

    #[test]
    fn test_references_list_linked_contributors() {
        let entity = article(Some(EntityId(9)));
        assert_eq!(
            entity.references(),
            vec![
                (ReferenceSlot::Author, EntityId(1)),
                (ReferenceSlot::PublishedIn, EntityId(9))
            ]
        );
    }

    #[test]
    fn test_link_contributor_by_position() {
        let mut entity = article(None);
        assert!(entity.link(ReferenceSlot::Author, 1, EntityId(2)));
        assert!(!entity.link(ReferenceSlot::Author, 5, EntityId(3)));
        assert!(!entity.link(ReferenceSlot::PartOf, 0, EntityId(3)));
        assert_eq!(entity.references().len(), 2);
    }

    #[test]
    fn test_repoint_counts_replacements() {
        let mut entity = article(Some(EntityId(9)));
        assert_eq!(entity.repoint(ReferenceSlot::PublishedIn, EntityId(9), EntityId(10)), 1);
        assert_eq!(entity.repoint(ReferenceSlot::PublishedIn, EntityId(9), EntityId(10)), 0);
        assert_eq!(entity.repoint(ReferenceSlot::Author, EntityId(1), EntityId(4)), 1);
        assert_eq!(
            entity.references(),
            vec![
                (ReferenceSlot::Author, EntityId(4)),
                (ReferenceSlot::PublishedIn, EntityId(10))
            ]
        );
    }

    #[test]
    fn test_update_display_fields_keeps_references() {
        let mut current = article(Some(EntityId(9)));
        let incoming = article(None);
        assert!(current.update_display_fields(&incoming));
        assert_eq!(current.references().len(), 2);

        let person = CanonicalEntity::Person(PersonDto::default());
        assert!(!current.update_display_fields(&person));
    }

    #[test]
    fn test_person_label() {
        let person = CanonicalEntity::Person(PersonDto {
            first_name: Some("Ana".to_string()),
            last_name: Some("Petrović".to_string()),
            ..Default::default()
        });
        assert_eq!(person.label().as_deref(), Some("Petrović, Ana"));
    }

    #[test]
    fn test_org_unit_relation() {
        let unit = CanonicalEntity::OrgUnit(OrganisationUnitDto {
            parent: Some(EntityId(2)),
            ..Default::default()
        });
        assert_eq!(
            unit.org_unit_relation(EntityId(1)),
            Some(OrganisationUnitRelation {
                source: EntityId(1),
                target: EntityId(2)
            })
        );
    }
}
