//! Typed CERIF entity variants as harvested from a repository.
//!
//! These structs mirror the OpenAIRE CERIF 1.1 profile elements the converter
//! consumes. They are filled by the dialect reader in [`crate::cerif`] and
//! never persisted: conversion hands ownership to canonical DTOs.

use serde::Serialize;

use crate::error::ConversionError;
use crate::model::canonical::ReferenceSlot;
use crate::model::EntityKind;

/// A text in a (raw, unvalidated) language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LangText {
    /// Language code as found in the feed, if any.
    pub lang: Option<String>,
    /// Text content.
    pub text: String,
}

impl LangText {
    /// Creates a language-tagged text.
    pub fn new(lang: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            lang: Some(lang.into()),
            text: text.into(),
        }
    }

    /// Creates a text without a language tag.
    pub fn untagged(text: impl Into<String>) -> Self {
        Self {
            lang: None,
            text: text.into(),
        }
    }
}

/// An author, editor, creator or inventor entry.
///
/// Feeds frequently name contributors that are not described as `Person`
/// records in the same repository, so the person link is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContributorRef {
    /// Name as printed on the work.
    pub display_name: Option<String>,
    /// External id of the linked `Person` record.
    pub person_id: Option<String>,
    /// External ids of org units the contributor was affiliated with.
    pub affiliations: Vec<String>,
}

/// Person-to-organisation affiliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Affiliation {
    /// External id of the organisation unit.
    pub org_unit_id: String,
    /// Role of the person within the unit.
    pub role: Option<String>,
}

/// `PartOf` link from an organisation unit to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartOf {
    /// External id of the parent organisation unit.
    pub org_unit_id: String,
}

/// CERIF `Person`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifPerson {
    /// CERIF id attribute.
    pub id: String,
    /// Family names.
    pub family_names: Option<String>,
    /// First names.
    pub first_names: Option<String>,
    /// ORCID iD.
    pub orcid: Option<String>,
    /// E-mail addresses.
    pub emails: Vec<String>,
    /// Affiliations.
    pub affiliations: Vec<Affiliation>,
    /// Research keywords.
    pub keywords: Vec<LangText>,
}

/// CERIF `OrgUnit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifOrgUnit {
    /// CERIF id attribute.
    pub id: String,
    /// Acronym.
    pub acronym: Option<String>,
    /// Names in various languages.
    pub names: Vec<LangText>,
    /// Organisation type.
    pub org_type: Option<String>,
    /// Parent unit.
    pub part_of: Option<PartOf>,
}

/// CERIF `Event`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifEvent {
    /// CERIF id attribute.
    pub id: String,
    /// Names in various languages.
    pub names: Vec<LangText>,
    /// Acronym.
    pub acronym: Option<String>,
    /// Place the event was held.
    pub place: Option<String>,
    /// Country code.
    pub country: Option<String>,
    /// Start date (ISO 8601).
    pub start_date: Option<String>,
    /// End date (ISO 8601).
    pub end_date: Option<String>,
    /// Descriptions.
    pub descriptions: Vec<LangText>,
    /// Keywords.
    pub keywords: Vec<LangText>,
}

/// CERIF `Product` (dataset, software).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifProduct {
    /// CERIF id attribute.
    pub id: String,
    /// Names in various languages.
    pub names: Vec<LangText>,
    /// Descriptions.
    pub descriptions: Vec<LangText>,
    /// Product type.
    pub product_type: Option<String>,
    /// Creators.
    pub creators: Vec<ContributorRef>,
    /// Keywords.
    pub keywords: Vec<LangText>,
    /// Landing page.
    pub url: Option<String>,
}

/// CERIF `Patent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifPatent {
    /// CERIF id attribute.
    pub id: String,
    /// Titles in various languages.
    pub titles: Vec<LangText>,
    /// Abstracts.
    pub abstracts: Vec<LangText>,
    /// Patent number.
    pub patent_number: Option<String>,
    /// Registration date.
    pub registration_date: Option<String>,
    /// Inventors.
    pub inventors: Vec<ContributorRef>,
    /// External ids of holder organisation units.
    pub holders: Vec<String>,
}

/// CERIF `Publication`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CerifPublication {
    /// CERIF id attribute.
    pub id: String,
    /// COAR resource type URI (or a bare type name).
    pub publication_type: Option<String>,
    /// Titles in various languages.
    pub titles: Vec<LangText>,
    /// Subtitles.
    pub subtitles: Vec<LangText>,
    /// Abstracts.
    pub abstracts: Vec<LangText>,
    /// Keywords.
    pub keywords: Vec<LangText>,
    /// Authors.
    pub authors: Vec<ContributorRef>,
    /// Editors.
    pub editors: Vec<ContributorRef>,
    /// External id of the containing publication (journal, proceedings, book).
    pub published_in: Option<String>,
    /// DOI.
    pub doi: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// Print ISSN.
    pub issn: Option<String>,
    /// Electronic ISSN.
    pub e_issn: Option<String>,
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

/// Sum type over the harvestable CERIF entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "entity")]
pub enum CerifEntity {
    /// A `Person` record.
    Person(CerifPerson),
    /// An `OrgUnit` record.
    OrgUnit(CerifOrgUnit),
    /// An `Event` record.
    Event(CerifEvent),
    /// A `Product` record.
    Product(CerifProduct),
    /// A `Patent` record.
    Patent(CerifPatent),
    /// A `Publication` record.
    Publication(CerifPublication),
}

impl CerifEntity {
    /// CERIF id attribute of the entity.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Person(p) => &p.id,
            Self::OrgUnit(o) => &o.id,
            Self::Event(e) => &e.id,
            Self::Product(p) => &p.id,
            Self::Patent(p) => &p.id,
            Self::Publication(p) => &p.id,
        }
    }

    /// Harvested kind of the entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Person(_) => EntityKind::Person,
            Self::OrgUnit(_) => EntityKind::OrgUnit,
            Self::Event(_) => EntityKind::Event,
            Self::Product(_) => EntityKind::Product,
            Self::Patent(_) => EntityKind::Patent,
            Self::Publication(_) => EntityKind::Publication,
        }
    }

    /// Structural validation: a non-empty id and at least one name or title.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::MissingField`] naming the first missing element.
    pub fn validate(&self) -> Result<(), ConversionError> {
        let id = self.id();
        if id.trim().is_empty() {
            return Err(missing(id, "id"));
        }
        let (has_label, field) = match self {
            Self::Person(p) => (
                non_blank(p.family_names.as_deref()) || non_blank(p.first_names.as_deref()),
                "PersonName",
            ),
            Self::OrgUnit(o) => (any_text(&o.names), "Name"),
            Self::Event(e) => (any_text(&e.names), "Name"),
            Self::Product(p) => (any_text(&p.names), "Name"),
            Self::Patent(p) => (any_text(&p.titles), "Title"),
            Self::Publication(p) => (any_text(&p.titles), "Title"),
        };
        if has_label {
            Ok(())
        } else {
            Err(missing(id, field))
        }
    }

    /// Outgoing references by external id, tagged with the slot they fill.
    #[must_use]
    pub fn references(&self) -> Vec<(ReferenceSlot, &str)> {
        let mut refs = Vec::new();
        match self {
            Self::Person(p) => {
                for affiliation in &p.affiliations {
                    refs.push((ReferenceSlot::Affiliation, affiliation.org_unit_id.as_str()));
                }
            },
            Self::OrgUnit(o) => {
                if let Some(part_of) = &o.part_of {
                    refs.push((ReferenceSlot::PartOf, part_of.org_unit_id.as_str()));
                }
            },
            Self::Event(_) => {},
            Self::Product(p) => {
                push_contributors(&mut refs, ReferenceSlot::Creator, &p.creators);
            },
            Self::Patent(p) => {
                push_contributors(&mut refs, ReferenceSlot::Inventor, &p.inventors);
                for holder in &p.holders {
                    refs.push((ReferenceSlot::Holder, holder.as_str()));
                }
            },
            Self::Publication(p) => {
                push_contributors(&mut refs, ReferenceSlot::Author, &p.authors);
                push_contributors(&mut refs, ReferenceSlot::Editor, &p.editors);
                if let Some(venue) = &p.published_in {
                    refs.push((ReferenceSlot::PublishedIn, venue.as_str()));
                }
            },
        }
        refs
    }
}

fn push_contributors<'a>(
    refs: &mut Vec<(ReferenceSlot, &'a str)>,
    slot: ReferenceSlot,
    contributors: &'a [ContributorRef],
) {
    refs.extend(
        contributors
            .iter()
            .filter_map(|c| c.person_id.as_deref())
            .map(|id| (slot, id)),
    );
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn any_text(texts: &[LangText]) -> bool {
    texts.iter().any(|t| !t.text.trim().is_empty())
}

fn missing(id: &str, field: &str) -> ConversionError {
    ConversionError::MissingField {
        external_id: id.to_string(),
        field: field.to_string(),
    }
}

/// OAI-PMH record header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    /// OAI identifier (e.g. `oai:repo:Persons/p1`).
    pub identifier: String,
    /// Last modification datestamp.
    pub datestamp: Option<String>,
    /// Sets the record belongs to.
    pub set_specs: Vec<String>,
    /// Whether the repository reports the record as deleted.
    pub deleted: bool,
}

/// One harvested record: header plus the CERIF entity read from its metadata.
///
/// Owned by the harvest run that produced it until conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestedRecord {
    /// OAI header.
    pub header: RecordHeader,
    /// Entity payload; `None` for deleted records and identifier-only listings.
    pub entity: Option<CerifEntity>,
}

impl HarvestedRecord {
    /// The external id: the CERIF id when a payload exists, otherwise the OAI identifier.
    #[must_use]
    pub fn external_id(&self) -> &str {
        self.entity
            .as_ref()
            .map_or(self.header.identifier.as_str(), CerifEntity::id)
    }

    /// Kind of the payload, if any.
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        self.entity.as_ref().map(CerifEntity::kind)
    }
}
