//! Reads CERIF entity elements into the typed schema model.

use crate::cerif::dialect::{CerifField, Dialect, DialectMapping};
use crate::error::ConversionError;
use crate::model::{
    Affiliation, CerifEntity, CerifEvent, CerifOrgUnit, CerifPatent, CerifPerson, CerifProduct,
    CerifPublication, ContributorRef, LangText, PartOf,
};
use crate::xml::{parse_document, XmlElement};

/// Reads the entity rooted at `root`, detecting the dialect from it.
///
/// `fallback_id` names the record in errors when the root carries no `id`.
///
/// # Errors
///
/// Returns [`ConversionError::UnsupportedEntity`] when the root is not one of
/// the six CERIF entities, and [`ConversionError::MissingField`] when
/// structural validation fails.
pub fn read_entity(root: &XmlElement, fallback_id: &str) -> Result<CerifEntity, ConversionError> {
    let mapping = Dialect::detect(root).mapping();
    let id = root.attr("id").map(str::trim).unwrap_or_default().to_string();
    let entity = match root.local_name.as_str() {
        "Person" => CerifEntity::Person(read_person(mapping, root, id)),
        "OrgUnit" => CerifEntity::OrgUnit(read_org_unit(mapping, root, id)),
        "Event" => CerifEntity::Event(read_event(mapping, root, id)),
        "Product" => CerifEntity::Product(read_product(mapping, root, id)),
        "Patent" => CerifEntity::Patent(read_patent(mapping, root, id)),
        "Publication" => CerifEntity::Publication(read_publication(mapping, root, id)),
        other => {
            return Err(ConversionError::UnsupportedEntity {
                external_id: fallback_id.to_string(),
                element: other.to_string(),
            })
        },
    };
    entity.validate().map_err(|err| match err {
        ConversionError::MissingField { field, .. } if field == "id" => ConversionError::MissingField {
            external_id: fallback_id.to_string(),
            field,
        },
        other => other,
    })?;
    Ok(entity)
}

/// Parses an XML string holding a single CERIF entity.
///
/// # Errors
///
/// Returns [`ConversionError::MalformedMetadata`] for unreadable XML, and the
/// errors of [`read_entity`] otherwise.
pub fn read_entity_str(xml: &str) -> Result<CerifEntity, ConversionError> {
    let root = parse_document(xml).map_err(|e| ConversionError::MalformedMetadata {
        external_id: String::new(),
        message: e.to_string(),
    })?;
    read_entity(&root, "")
}

fn read_person(m: &DialectMapping, root: &XmlElement, id: String) -> CerifPerson {
    CerifPerson {
        id,
        family_names: m.text(root, CerifField::FamilyNames),
        first_names: m.text(root, CerifField::FirstNames),
        orcid: m.text(root, CerifField::Orcid),
        emails: m
            .texts(root, CerifField::Email)
            .into_iter()
            .map(|address| {
                address
                    .strip_prefix("mailto:")
                    .map_or(address.clone(), str::to_string)
            })
            .collect(),
        affiliations: m
            .elements(root, CerifField::Affiliation)
            .into_iter()
            .filter_map(|affiliation| {
                let org_unit_id = referenced_id(affiliation.child("OrgUnit")?)?;
                Some(Affiliation {
                    org_unit_id,
                    role: affiliation.text_at(&["Role"]),
                })
            })
            .collect(),
        keywords: lang_texts(m, root, CerifField::Keyword),
    }
}

fn read_org_unit(m: &DialectMapping, root: &XmlElement, id: String) -> CerifOrgUnit {
    CerifOrgUnit {
        id,
        acronym: m.text(root, CerifField::Acronym),
        names: lang_texts(m, root, CerifField::Name),
        org_type: m.text(root, CerifField::Type),
        part_of: m
            .elements(root, CerifField::PartOf)
            .into_iter()
            .find_map(referenced_id)
            .map(|org_unit_id| PartOf { org_unit_id }),
    }
}

fn read_event(m: &DialectMapping, root: &XmlElement, id: String) -> CerifEvent {
    CerifEvent {
        id,
        names: lang_texts(m, root, CerifField::Name),
        acronym: m.text(root, CerifField::Acronym),
        place: m.text(root, CerifField::Place),
        country: m.text(root, CerifField::Country),
        start_date: m.text(root, CerifField::StartDate),
        end_date: m.text(root, CerifField::EndDate),
        descriptions: lang_texts(m, root, CerifField::Description),
        keywords: lang_texts(m, root, CerifField::Keyword),
    }
}

fn read_product(m: &DialectMapping, root: &XmlElement, id: String) -> CerifProduct {
    CerifProduct {
        id,
        names: lang_texts(m, root, CerifField::Name),
        descriptions: lang_texts(m, root, CerifField::Description),
        product_type: m.text(root, CerifField::Type),
        creators: contributors(m, root, CerifField::Creator),
        keywords: lang_texts(m, root, CerifField::Keyword),
        url: m.text(root, CerifField::Url),
    }
}

fn read_patent(m: &DialectMapping, root: &XmlElement, id: String) -> CerifPatent {
    CerifPatent {
        id,
        titles: lang_texts(m, root, CerifField::Title),
        abstracts: lang_texts(m, root, CerifField::Abstract),
        patent_number: m.text(root, CerifField::PatentNumber),
        registration_date: m.text(root, CerifField::RegistrationDate),
        inventors: contributors(m, root, CerifField::Inventor),
        holders: m
            .elements(root, CerifField::Holder)
            .into_iter()
            .filter_map(referenced_id)
            .collect(),
    }
}

fn read_publication(m: &DialectMapping, root: &XmlElement, id: String) -> CerifPublication {
    let mut issn = None;
    let mut e_issn = None;
    for element in m.elements(root, CerifField::Issn) {
        let Some(value) = element.trimmed_text() else {
            continue;
        };
        let online = element
            .attr("medium")
            .is_some_and(|medium| medium.contains("Online"));
        let slot = if online { &mut e_issn } else { &mut issn };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    CerifPublication {
        id,
        publication_type: m.text(root, CerifField::Type),
        titles: lang_texts(m, root, CerifField::Title),
        subtitles: lang_texts(m, root, CerifField::Subtitle),
        abstracts: lang_texts(m, root, CerifField::Abstract),
        keywords: lang_texts(m, root, CerifField::Keyword),
        authors: contributors(m, root, CerifField::Author),
        editors: contributors(m, root, CerifField::Editor),
        published_in: m
            .elements(root, CerifField::PublishedIn)
            .into_iter()
            .find_map(referenced_id),
        doi: m.text(root, CerifField::Doi),
        isbn: m.text(root, CerifField::Isbn),
        issn,
        e_issn,
        publication_date: m.text(root, CerifField::PublicationDate),
        volume: m.text(root, CerifField::Volume),
        issue: m.text(root, CerifField::Issue),
        start_page: m.text(root, CerifField::StartPage),
        end_page: m.text(root, CerifField::EndPage),
    }
}

fn lang_texts(m: &DialectMapping, root: &XmlElement, field: CerifField) -> Vec<LangText> {
    m.elements(root, field)
        .into_iter()
        .filter_map(|element| {
            Some(LangText {
                lang: m.language_of(element).map(str::to_string),
                text: element.trimmed_text()?,
            })
        })
        .collect()
}

fn contributors(m: &DialectMapping, root: &XmlElement, field: CerifField) -> Vec<ContributorRef> {
    m.elements(root, field)
        .into_iter()
        .map(|contributor| ContributorRef {
            display_name: contributor.text_at(&["DisplayName"]),
            person_id: contributor.child("Person").and_then(referenced_id),
            affiliations: contributor
                .find_all(&["Affiliation", "OrgUnit"])
                .into_iter()
                .filter_map(referenced_id)
                .collect(),
        })
        .filter(|c| c.display_name.is_some() || c.person_id.is_some())
        .collect()
}

fn referenced_id(element: &XmlElement) -> Option<String> {
    element
        .attr("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
