//! CERIF dialect detection and declarative field-mapping tables.
//!
//! Repositories publish the OpenAIRE CERIF 1.1 profile in two shapes:
//!
//! - **Legacy**: namespace-prefixed elements (`<cerif:Person>`), languages in
//!   `xml:lang`, plural person-name elements (`FamilyNames`, `FirstNames`)
//!   and identifiers directly under the entity (`<cerif:DOI>`).
//! - **Schema-qualified**: a default namespace plus `xsi:schemaLocation`,
//!   languages in a plain `lang` attribute, singular person-name elements and
//!   identifiers grouped under `<Identifiers>`.
//!
//! Both feed the same typed structs: the reader asks a [`DialectMapping`] for
//! the element path of each [`CerifField`], and the mapping answers from a
//! shared table plus per-dialect overrides.

use crate::xml::XmlElement;

/// The two supported CERIF dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Namespace-prefixed legacy form.
    Legacy,
    /// Default-namespace, schema-qualified form.
    SchemaQualified,
}

impl Dialect {
    /// Detects the dialect from the entity root element.
    ///
    /// A prefixed root is legacy; anything else is read as schema-qualified.
    #[must_use]
    pub fn detect(root: &XmlElement) -> Self {
        if root.prefix().is_some() {
            Self::Legacy
        } else {
            Self::SchemaQualified
        }
    }

    /// Mapping table for this dialect.
    #[must_use]
    pub fn mapping(self) -> &'static DialectMapping {
        match self {
            Self::Legacy => &LEGACY,
            Self::SchemaQualified => &SCHEMA_QUALIFIED,
        }
    }
}

/// Fields the reader extracts, independent of dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CerifField {
    /// Person family names.
    FamilyNames,
    /// Person first names.
    FirstNames,
    /// ORCID iD.
    Orcid,
    /// E-mail address.
    Email,
    /// Person affiliation elements.
    Affiliation,
    /// Acronym.
    Acronym,
    /// Name (org unit, event, product).
    Name,
    /// Type (org unit, product, publication).
    Type,
    /// Parent org unit reference.
    PartOf,
    /// Event place.
    Place,
    /// Event country.
    Country,
    /// Event start date.
    StartDate,
    /// Event end date.
    EndDate,
    /// Description.
    Description,
    /// Keyword.
    Keyword,
    /// Landing page.
    Url,
    /// Product creator elements.
    Creator,
    /// Title (patent, publication).
    Title,
    /// Subtitle.
    Subtitle,
    /// Abstract.
    Abstract,
    /// Patent number.
    PatentNumber,
    /// Patent registration date.
    RegistrationDate,
    /// Patent inventor elements.
    Inventor,
    /// Patent holder org unit references.
    Holder,
    /// Publication author elements.
    Author,
    /// Publication editor elements.
    Editor,
    /// Containing publication reference.
    PublishedIn,
    /// DOI.
    Doi,
    /// ISBN.
    Isbn,
    /// ISSN (print or online, by `medium`).
    Issn,
    /// Publication date.
    PublicationDate,
    /// Volume.
    Volume,
    /// Issue.
    Issue,
    /// First page.
    StartPage,
    /// Last page.
    EndPage,
}

/// One row of a mapping table: where a field lives, relative to the entity root.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    /// Field.
    pub field: CerifField,
    /// Local element names from the entity root.
    pub path: &'static [&'static str],
}

const fn map(field: CerifField, path: &'static [&'static str]) -> FieldMapping {
    FieldMapping { field, path }
}

/// Paths shared by both dialects.
const COMMON_FIELDS: &[FieldMapping] = &[
    map(CerifField::Orcid, &["ORCID"]),
    map(CerifField::Email, &["ElectronicAddress"]),
    map(CerifField::Affiliation, &["Affiliation"]),
    map(CerifField::Acronym, &["Acronym"]),
    map(CerifField::Name, &["Name"]),
    map(CerifField::Type, &["Type"]),
    map(CerifField::PartOf, &["PartOf", "OrgUnit"]),
    map(CerifField::Place, &["Place"]),
    map(CerifField::Country, &["Country"]),
    map(CerifField::StartDate, &["StartDate"]),
    map(CerifField::EndDate, &["EndDate"]),
    map(CerifField::Description, &["Description"]),
    map(CerifField::Keyword, &["Keyword"]),
    map(CerifField::Url, &["URL"]),
    map(CerifField::Creator, &["Creators", "Creator"]),
    map(CerifField::Title, &["Title"]),
    map(CerifField::Subtitle, &["Subtitle"]),
    map(CerifField::Abstract, &["Abstract"]),
    map(CerifField::PatentNumber, &["PatentNumber"]),
    map(CerifField::RegistrationDate, &["RegistrationDate"]),
    map(CerifField::Inventor, &["Inventors", "Inventor"]),
    map(CerifField::Holder, &["Holders", "Holder", "OrgUnit"]),
    map(CerifField::Author, &["Authors", "Author"]),
    map(CerifField::Editor, &["Editors", "Editor"]),
    map(CerifField::PublishedIn, &["PublishedIn", "Publication"]),
    map(CerifField::PublicationDate, &["PublicationDate"]),
    map(CerifField::Volume, &["Volume"]),
    map(CerifField::Issue, &["Issue"]),
    map(CerifField::StartPage, &["StartPage"]),
    map(CerifField::EndPage, &["EndPage"]),
];

const LEGACY_FIELDS: &[FieldMapping] = &[
    map(CerifField::FamilyNames, &["PersonName", "FamilyNames"]),
    map(CerifField::FirstNames, &["PersonName", "FirstNames"]),
    map(CerifField::Doi, &["DOI"]),
    map(CerifField::Isbn, &["ISBN"]),
    map(CerifField::Issn, &["ISSN"]),
];

const SCHEMA_QUALIFIED_FIELDS: &[FieldMapping] = &[
    map(CerifField::FamilyNames, &["PersonName", "FamilyName"]),
    map(CerifField::FirstNames, &["PersonName", "FirstName"]),
    map(CerifField::Doi, &["Identifiers", "DOI"]),
    map(CerifField::Isbn, &["Identifiers", "ISBN"]),
    map(CerifField::Issn, &["Identifiers", "ISSN"]),
];

/// Dialect-specific view over the mapping tables.
#[derive(Debug)]
pub struct DialectMapping {
    /// Dialect this mapping reads.
    pub dialect: Dialect,
    /// Qualified name of the language attribute.
    pub lang_attribute: &'static str,
    /// Dialect-specific rows, consulted before [`COMMON_FIELDS`].
    pub fields: &'static [FieldMapping],
}

static LEGACY: DialectMapping = DialectMapping {
    dialect: Dialect::Legacy,
    lang_attribute: "xml:lang",
    fields: LEGACY_FIELDS,
};

static SCHEMA_QUALIFIED: DialectMapping = DialectMapping {
    dialect: Dialect::SchemaQualified,
    lang_attribute: "lang",
    fields: SCHEMA_QUALIFIED_FIELDS,
};

impl DialectMapping {
    /// Element path of a field.
    #[must_use]
    pub fn path(&self, field: CerifField) -> &'static [&'static str] {
        self.fields
            .iter()
            .chain(COMMON_FIELDS)
            .find(|m| m.field == field)
            .map(|m| m.path)
            .unwrap_or(&[])
    }

    /// Language code of a text element.
    ///
    /// The schema-qualified form also tolerates `xml:lang`, which shares the
    /// local name.
    #[must_use]
    pub fn language_of<'a>(&self, element: &'a XmlElement) -> Option<&'a str> {
        match self.dialect {
            Dialect::Legacy => element.attr_qualified(self.lang_attribute),
            Dialect::SchemaQualified => element.attr(self.lang_attribute),
        }
    }

    /// Trimmed text of the first element for `field`.
    #[must_use]
    pub fn text(&self, root: &XmlElement, field: CerifField) -> Option<String> {
        root.text_at(self.path(field))
    }

    /// Trimmed texts of every element for `field`.
    #[must_use]
    pub fn texts(&self, root: &XmlElement, field: CerifField) -> Vec<String> {
        root.find_all(self.path(field))
            .into_iter()
            .filter_map(XmlElement::trimmed_text)
            .collect()
    }

    /// Every element for `field`.
    #[must_use]
    pub fn elements<'a>(&self, root: &'a XmlElement, field: CerifField) -> Vec<&'a XmlElement> {
        root.find_all(self.path(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn test_detect_prefixed_is_legacy() {
        let root = parse_document(r#"<cerif:Person xmlns:cerif="urn:c" id="p1"/>"#).unwrap();
        assert_eq!(Dialect::detect(&root), Dialect::Legacy);
    }

    #[test]
    fn test_detect_default_namespace_is_schema_qualified() {
        let root = parse_document(
            r#"<Person xmlns="https://www.openaire.eu/cerif-profile/1.1/"
                xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
                xsi:schemaLocation="https://www.openaire.eu/cerif-profile/1.1/ x.xsd" id="p1"/>"#,
        )
        .unwrap();
        assert_eq!(Dialect::detect(&root), Dialect::SchemaQualified);
    }

    #[test]
    fn test_every_field_has_a_path_in_both_dialects() {
        let fields = [
            CerifField::FamilyNames,
            CerifField::FirstNames,
            CerifField::Doi,
            CerifField::Isbn,
            CerifField::Issn,
            CerifField::Title,
            CerifField::PartOf,
            CerifField::Creator,
        ];
        for dialect in [Dialect::Legacy, Dialect::SchemaQualified] {
            for field in fields {
                assert!(
                    !dialect.mapping().path(field).is_empty(),
                    "{dialect:?} has no path for {field:?}"
                );
            }
        }
    }

    #[test]
    fn test_overrides_differ_between_dialects() {
        assert_eq!(
            Dialect::Legacy.mapping().path(CerifField::FamilyNames),
            &["PersonName", "FamilyNames"]
        );
        assert_eq!(
            Dialect::SchemaQualified.mapping().path(CerifField::FamilyNames),
            &["PersonName", "FamilyName"]
        );
        assert_eq!(
            Dialect::SchemaQualified.mapping().path(CerifField::Doi),
            &["Identifiers", "DOI"]
        );
    }

    #[test]
    fn test_language_attribute_per_dialect() {
        let legacy = parse_document(r#"<c:Name xmlns:c="urn:c" xml:lang="en">X</c:Name>"#).unwrap();
        assert_eq!(Dialect::Legacy.mapping().language_of(&legacy), Some("en"));

        let plain = parse_document(r#"<Name lang="sr">X</Name>"#).unwrap();
        assert_eq!(Dialect::SchemaQualified.mapping().language_of(&plain), Some("sr"));
        assert_eq!(Dialect::Legacy.mapping().language_of(&plain), None);
    }
}
