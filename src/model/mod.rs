//! Data model for harvested and canonical research entities.
//!
//! - [`cerif`] holds the typed external CERIF entity variants as read from a
//!   repository feed (the schema model layer).
//! - [`canonical`] holds the normalized internal DTOs persisted in the store.
//! - [`provenance`] tracks which run and user imported a record and whether it
//!   has been committed.

pub mod canonical;
pub mod cerif;
pub mod provenance;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use canonical::{
    CanonicalEntity, Contributor, EventDto, OrganisationUnitDto, OrganisationUnitRelation, PatentDto,
    PersonDto, ProductDto, PublicationDto, PublicationSeriesDto, ReferenceSlot,
};
pub use cerif::{
    Affiliation, CerifEntity, CerifEvent, CerifOrgUnit, CerifPatent, CerifPerson, CerifProduct,
    CerifPublication, ContributorRef, HarvestedRecord, LangText, PartOf, RecordHeader,
};
pub use provenance::{ImportProvenance, UserId};

/// Identifier of a canonical entity in the persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of one harvest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a fresh random run id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a research entity.
///
/// The first six kinds are harvested directly. `PublicationSeries` (journals
/// and other series) is produced from harvested publications whose type is a
/// series type, and is what `PublishedIn` links of articles resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A researcher.
    Person,
    /// An organisation unit (institution, faculty, department).
    OrgUnit,
    /// A conference or other event.
    Event,
    /// A research product (dataset, software).
    Product,
    /// A patent.
    Patent,
    /// A publication (article, book, chapter, paper).
    Publication,
    /// A journal or other publication series.
    PublicationSeries,
}

impl EntityKind {
    /// Kind of the CERIF record an entity of this kind is harvested from.
    ///
    /// Series arrive as publications, so both share one id space per handler.
    #[must_use]
    pub fn harvested(self) -> Self {
        match self {
            Self::PublicationSeries => Self::Publication,
            other => other,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Person => "Person",
            Self::OrgUnit => "OrgUnit",
            Self::Event => "Event",
            Self::Product => "Product",
            Self::Patent => "Patent",
            Self::Publication => "Publication",
            Self::PublicationSeries => "PublicationSeries",
        };
        f.write_str(name)
    }
}

/// Idempotence key of a harvested record: the handler it came from, the
/// harvested kind, and the identifier it carries in that repository.
///
/// CERIF feeds number each entity kind on its own, so `Person id="1"` and
/// `OrgUnit id="1"` are different records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    /// Name of the handler the record was harvested from.
    pub handler: String,
    /// Harvested kind of the record (see [`EntityKind::harvested`]).
    pub kind: EntityKind,
    /// CERIF `id` attribute of the record.
    pub external_id: String,
}

impl SourceKey {
    /// Creates a source key. `kind` is folded to its harvested kind.
    pub fn new(handler: impl Into<String>, kind: EntityKind, external_id: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            kind: kind.harvested(),
            external_id: external_id.into(),
        }
    }
}
