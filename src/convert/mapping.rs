//! Field mapping from the CERIF schema model onto canonical DTOs.
//!
//! The mapping is pure: it reads one [`CerifEntity`], sends every free-text
//! field through the [`Normalizer`] and returns the canonical entity plus the
//! references it still has to resolve. Contributor positions in the canonical
//! lists match the positions in the harvested lists, so a pending link can
//! address "author #2" before any person has a store id.

use lazy_static::lazy_static;
use regex::Regex;

use crate::convert::resolution::PendingLink;
use crate::model::canonical::Contributor;
use crate::model::{
    CanonicalEntity, CerifEntity, CerifEvent, CerifOrgUnit, CerifPatent, CerifPerson, CerifProduct,
    CerifPublication, ContributorRef, EntityKind, EventDto, OrganisationUnitDto, PatentDto, PersonDto,
    ProductDto, PublicationDto, PublicationSeriesDto, ReferenceSlot,
};
use crate::multilingual::{LanguageTagRegistry, Normalizer};

lazy_static! {
    static ref DOI_PREFIX: Regex = Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)").unwrap();
    static ref ISSN: Regex = Regex::new(r"^(\d{4})-?(\d{3}[\dXx])$").unwrap();
    static ref SERIES_TYPE: Regex =
        Regex::new(r"(?i)(?:resource_type/c_0640|^journal$|^series$|^book series$)").unwrap();
}

/// Converted entity with its unresolved references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapped {
    /// Canonical entity, references empty.
    pub entity: CanonicalEntity,
    /// References still naming their targets by external id.
    pub links: Vec<PendingLink>,
    /// External id of the parent org unit, for cycle detection.
    pub part_of: Option<String>,
    /// Harvested kind of the source record.
    pub source_kind: EntityKind,
}

/// Converts a harvested entity into its canonical form.
///
/// A publication whose type is a journal or series type becomes a
/// [`CanonicalEntity::PublicationSeries`].
pub fn to_canonical<R>(entity: &CerifEntity, normalizer: &Normalizer<'_, R>) -> Mapped
where
    R: LanguageTagRegistry + ?Sized,
{
    let mut links = Vec::new();
    let mut part_of = None;
    let source_kind = entity.kind();
    let entity = match entity {
        CerifEntity::Person(p) => CanonicalEntity::Person(person(p, normalizer, &mut links)),
        CerifEntity::OrgUnit(o) => {
            part_of = o.part_of.as_ref().map(|p| p.org_unit_id.clone());
            CanonicalEntity::OrgUnit(org_unit(o, normalizer, &mut links))
        },
        CerifEntity::Event(e) => CanonicalEntity::Event(event(e, normalizer)),
        CerifEntity::Product(p) => CanonicalEntity::Product(product(p, normalizer, &mut links)),
        CerifEntity::Patent(p) => CanonicalEntity::Patent(patent(p, normalizer, &mut links)),
        CerifEntity::Publication(p) if is_series_type(p.publication_type.as_deref()) => {
            CanonicalEntity::PublicationSeries(series(p, normalizer))
        },
        CerifEntity::Publication(p) => CanonicalEntity::Publication(publication(p, normalizer, &mut links)),
    };
    Mapped {
        entity,
        links,
        part_of,
        source_kind,
    }
}

/// Whether a CERIF publication type denotes a journal or other series.
#[must_use]
pub fn is_series_type(publication_type: Option<&str>) -> bool {
    publication_type.is_some_and(|t| SERIES_TYPE.is_match(t.trim()))
}

/// Lowercases a DOI and strips resolver and `doi:` prefixes.
#[must_use]
pub fn normalize_doi(doi: &str) -> Option<String> {
    let bare = DOI_PREFIX.replace(doi.trim(), "");
    let bare = bare.trim();
    (!bare.is_empty()).then(|| bare.to_lowercase())
}

/// Brings an ISSN into `NNNN-NNNC` form; `None` when it is not an ISSN.
#[must_use]
pub fn normalize_issn(issn: &str) -> Option<String> {
    let compact: String = issn.chars().filter(|c| !c.is_whitespace()).collect();
    ISSN.captures(&compact)
        .map(|caps| format!("{}-{}", &caps[1], caps[2].to_uppercase()))
}

fn person<R: LanguageTagRegistry + ?Sized>(
    p: &CerifPerson,
    normalizer: &Normalizer<'_, R>,
    links: &mut Vec<PendingLink>,
) -> PersonDto {
    for affiliation in &p.affiliations {
        links.push(link(ReferenceSlot::Affiliation, 0, &affiliation.org_unit_id));
    }
    PersonDto {
        first_name: p.first_names.clone(),
        last_name: p.family_names.clone(),
        orcid: p.orcid.as_deref().map(normalize_orcid),
        emails: p.emails.clone(),
        keywords: normalizer.normalize_texts(&p.keywords),
        affiliations: Vec::new(),
    }
}

fn org_unit<R: LanguageTagRegistry + ?Sized>(
    o: &CerifOrgUnit,
    normalizer: &Normalizer<'_, R>,
    links: &mut Vec<PendingLink>,
) -> OrganisationUnitDto {
    if let Some(parent) = &o.part_of {
        links.push(link(ReferenceSlot::PartOf, 0, &parent.org_unit_id));
    }
    OrganisationUnitDto {
        name: normalizer.normalize_texts(&o.names),
        acronym: o.acronym.clone(),
        org_type: o.org_type.clone(),
        parent: None,
        ancestors: Vec::new(),
    }
}

fn event<R: LanguageTagRegistry + ?Sized>(e: &CerifEvent, normalizer: &Normalizer<'_, R>) -> EventDto {
    EventDto {
        name: normalizer.normalize_texts(&e.names),
        acronym: e.acronym.clone(),
        place: e.place.clone(),
        country: e.country.clone(),
        start_date: e.start_date.clone(),
        end_date: e.end_date.clone(),
        description: normalizer.normalize_texts(&e.descriptions),
        keywords: normalizer.normalize_texts(&e.keywords),
    }
}

fn product<R: LanguageTagRegistry + ?Sized>(
    p: &CerifProduct,
    normalizer: &Normalizer<'_, R>,
    links: &mut Vec<PendingLink>,
) -> ProductDto {
    ProductDto {
        name: normalizer.normalize_texts(&p.names),
        description: normalizer.normalize_texts(&p.descriptions),
        product_type: p.product_type.clone(),
        url: p.url.clone(),
        keywords: normalizer.normalize_texts(&p.keywords),
        creators: contributors(&p.creators, ReferenceSlot::Creator, links),
    }
}

fn patent<R: LanguageTagRegistry + ?Sized>(
    p: &CerifPatent,
    normalizer: &Normalizer<'_, R>,
    links: &mut Vec<PendingLink>,
) -> PatentDto {
    let inventors = contributors(&p.inventors, ReferenceSlot::Inventor, links);
    for holder in &p.holders {
        links.push(link(ReferenceSlot::Holder, 0, holder));
    }
    PatentDto {
        title: normalizer.normalize_texts(&p.titles),
        description: normalizer.normalize_texts(&p.abstracts),
        patent_number: p.patent_number.clone(),
        registration_date: p.registration_date.clone(),
        inventors,
        holders: Vec::new(),
    }
}

fn publication<R: LanguageTagRegistry + ?Sized>(
    p: &CerifPublication,
    normalizer: &Normalizer<'_, R>,
    links: &mut Vec<PendingLink>,
) -> PublicationDto {
    let authors = contributors(&p.authors, ReferenceSlot::Author, links);
    let editors = contributors(&p.editors, ReferenceSlot::Editor, links);
    if let Some(venue) = &p.published_in {
        links.push(link(ReferenceSlot::PublishedIn, 0, venue));
    }
    PublicationDto {
        publication_type: p.publication_type.clone(),
        title: normalizer.normalize_texts(&p.titles),
        subtitle: normalizer.normalize_texts(&p.subtitles),
        description: normalizer.normalize_texts(&p.abstracts),
        keywords: normalizer.normalize_texts(&p.keywords),
        authors,
        editors,
        published_in: None,
        doi: p.doi.as_deref().and_then(normalize_doi),
        isbn: p.isbn.clone(),
        publication_date: p.publication_date.clone(),
        volume: p.volume.clone(),
        issue: p.issue.clone(),
        start_page: p.start_page.clone(),
        end_page: p.end_page.clone(),
    }
}

fn series<R: LanguageTagRegistry + ?Sized>(
    p: &CerifPublication,
    normalizer: &Normalizer<'_, R>,
) -> PublicationSeriesDto {
    PublicationSeriesDto {
        title: normalizer.normalize_texts(&p.titles),
        issn: p.issn.as_deref().and_then(normalize_issn),
        e_issn: p.e_issn.as_deref().and_then(normalize_issn),
    }
}

fn contributors(
    refs: &[ContributorRef],
    slot: ReferenceSlot,
    links: &mut Vec<PendingLink>,
) -> Vec<Contributor> {
    refs.iter()
        .enumerate()
        .map(|(position, contributor)| {
            if let Some(person) = &contributor.person_id {
                links.push(link(slot, position, person));
            }
            Contributor {
                display_name: contributor.display_name.clone(),
                person: None,
            }
        })
        .collect()
}

fn link(slot: ReferenceSlot, position: usize, target: &str) -> PendingLink {
    PendingLink::new(slot, position, target)
}

fn normalize_orcid(orcid: &str) -> String {
    orcid
        .trim()
        .trim_start_matches("https://orcid.org/")
        .trim_start_matches("http://orcid.org/")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Affiliation, LangText, PartOf};
    use crate::multilingual::InMemoryLanguageTagRegistry;

    fn registry() -> InMemoryLanguageTagRegistry {
        InMemoryLanguageTagRegistry::from_codes(["EN", "SR"])
    }

    #[test]
    fn test_doi_normalization() {
        assert_eq!(normalize_doi("https://doi.org/10.1000/ABC").as_deref(), Some("10.1000/abc"));
        assert_eq!(normalize_doi("doi: 10.1000/X").as_deref(), Some("10.1000/x"));
        assert_eq!(normalize_doi("http://dx.doi.org/10.1/y").as_deref(), Some("10.1/y"));
        assert_eq!(normalize_doi("  "), None);
    }

    #[test]
    fn test_issn_normalization() {
        assert_eq!(normalize_issn("03784371").as_deref(), Some("0378-4371"));
        assert_eq!(normalize_issn("1234-567x").as_deref(), Some("1234-567X"));
        assert_eq!(normalize_issn("not an issn"), None);
    }

    #[test]
    fn test_series_type_detection() {
        assert!(is_series_type(Some("http://purl.org/coar/resource_type/c_0640")));
        assert!(is_series_type(Some("Journal")));
        assert!(!is_series_type(Some("http://purl.org/coar/resource_type/c_6501")));
        assert!(!is_series_type(None));
    }

    #[test]
    fn test_product_creators_keep_positions() {
        let registry = registry();
        let normalizer = Normalizer::new(&registry);
        let product = CerifEntity::Product(CerifProduct {
            id: "prod1".to_string(),
            names: vec![LangText::new("en", "Dataset"), LangText::new("de", "Datensatz")],
            creators: vec![
                ContributorRef {
                    display_name: Some("Anon".to_string()),
                    ..Default::default()
                },
                ContributorRef {
                    person_id: Some("p1".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        });
        let mapped = to_canonical(&product, &normalizer);
        assert_eq!(mapped.links, vec![link(ReferenceSlot::Creator, 1, "p1")]);
        match mapped.entity {
            CanonicalEntity::Product(p) => {
                assert_eq!(p.creators.len(), 2);
                assert_eq!(p.name.len(), 1);
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_org_unit_part_of_and_person_affiliation() {
        let registry = registry();
        let normalizer = Normalizer::new(&registry);
        let unit = CerifEntity::OrgUnit(CerifOrgUnit {
            id: "A".to_string(),
            names: vec![LangText::new("en", "Dept")],
            part_of: Some(PartOf {
                org_unit_id: "B".to_string(),
            }),
            ..Default::default()
        });
        let mapped = to_canonical(&unit, &normalizer);
        assert_eq!(mapped.part_of.as_deref(), Some("B"));
        assert_eq!(mapped.links, vec![link(ReferenceSlot::PartOf, 0, "B")]);

        let person = CerifEntity::Person(CerifPerson {
            id: "p1".to_string(),
            family_names: Some("Doe".to_string()),
            orcid: Some("https://orcid.org/0000-0002-1825-009x".to_string()),
            affiliations: vec![Affiliation {
                org_unit_id: "A".to_string(),
                role: None,
            }],
            ..Default::default()
        });
        let mapped = to_canonical(&person, &normalizer);
        assert_eq!(mapped.links, vec![link(ReferenceSlot::Affiliation, 0, "A")]);
        match mapped.entity {
            CanonicalEntity::Person(p) => assert_eq!(p.orcid.as_deref(), Some("0000-0002-1825-009X")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_journal_becomes_series() {
        let registry = registry();
        let normalizer = Normalizer::new(&registry);
        let journal = CerifEntity::Publication(CerifPublication {
            id: "j1".to_string(),
            publication_type: Some("http://purl.org/coar/resource_type/c_0640".to_string()),
            titles: vec![LangText::new("en", "Journal of Tests")],
            issn: Some("03784371".to_string()),
            ..Default::default()
        });
        let mapped = to_canonical(&journal, &normalizer);
        assert!(mapped.links.is_empty());
        match mapped.entity {
            CanonicalEntity::PublicationSeries(s) => {
                assert_eq!(s.issn.as_deref(), Some("0378-4371"));
                assert_eq!(s.title.text_for("EN"), Some("Journal of Tests"));
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
