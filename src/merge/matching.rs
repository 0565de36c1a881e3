//! Duplicate detection: which stored entities denote the same object.
//!
//! Two entities of one kind are a certain match when they share a persistent
//! identifier (ORCID, DOI, ISSN, patent number, URL), are never a match when
//! their identifiers conflict, and are a probable match when their names or
//! titles are close under Jaro–Winkler similarity.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::model::{CanonicalEntity, EntityId, EntityKind};
use crate::multilingual::MultilingualContent;
use crate::store::{EntityStore, StoredEntity};

/// Default similarity threshold for probable matches.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.93;

/// How sure a match is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "confidence", content = "score", rename_all = "snake_case")]
pub enum MatchConfidence {
    /// A shared persistent identifier.
    Certain,
    /// Similar labels; the best Jaro–Winkler score found.
    Probable(f64),
}

/// Two entities of one kind that look like duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidatePair {
    /// Kind of both entities.
    pub kind: EntityKind,
    /// Lower id.
    pub first: EntityId,
    /// Higher id.
    pub second: EntityId,
    /// Match strength.
    pub confidence: MatchConfidence,
}

/// Identifier comparison between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identifiers {
    Same,
    Conflict,
    Unknown,
}

/// Pairwise duplicate assessment with a configurable similarity threshold.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateMatcher {
    threshold: f64,
}

impl Default for DuplicateMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DuplicateMatcher {
    /// Creates a matcher with the default threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the similarity threshold (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Decides whether `a` and `b` denote the same object.
    #[must_use]
    pub fn assess(&self, a: &CanonicalEntity, b: &CanonicalEntity) -> Option<MatchConfidence> {
        if a.kind() != b.kind() {
            return None;
        }
        match compare_identifiers(a, b) {
            Identifiers::Same => return Some(MatchConfidence::Certain),
            Identifiers::Conflict => return None,
            Identifiers::Unknown => {},
        }
        let left = labels(a);
        let right = labels(b);
        let best = left
            .iter()
            .flat_map(|l| right.iter().map(move |r| strsim::jaro_winkler(l, r)))
            .fold(0.0_f64, f64::max);
        (best >= self.threshold).then_some(MatchConfidence::Probable(best))
    }

    /// Scans every stored entity of `kind` for duplicate pairs, in parallel.
    ///
    /// Pairs are ordered by `(first, second)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HarvestError::Store`] when listing fails.
    pub fn find_candidates<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        kind: EntityKind,
    ) -> Result<Vec<MergeCandidatePair>> {
        let entities: Vec<StoredEntity> = store.list(kind)?;
        let mut pairs: Vec<MergeCandidatePair> = (0..entities.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let entities = &entities;
                (i + 1..entities.len()).filter_map(move |j| {
                    let (a, b) = (&entities[i], &entities[j]);
                    self.assess(&a.entity, &b.entity).map(|confidence| MergeCandidatePair {
                        kind,
                        first: a.id.min(b.id),
                        second: a.id.max(b.id),
                        confidence,
                    })
                })
            })
            .collect();
        pairs.sort_by_key(|p| (p.first, p.second));
        Ok(pairs)
    }
}

fn compare_identifiers(a: &CanonicalEntity, b: &CanonicalEntity) -> Identifiers {
    use CanonicalEntity as E;
    match (a, b) {
        (E::Person(x), E::Person(y)) => compare(x.orcid.as_deref(), y.orcid.as_deref()),
        (E::Publication(x), E::Publication(y)) => compare(x.doi.as_deref(), y.doi.as_deref())
            .or_else(|| compare(x.isbn.as_deref(), y.isbn.as_deref())),
        (E::PublicationSeries(x), E::PublicationSeries(y)) => {
            let left: Vec<&str> = x.issn.iter().chain(&x.e_issn).map(String::as_str).collect();
            let right: Vec<&str> = y.issn.iter().chain(&y.e_issn).map(String::as_str).collect();
            if left.iter().any(|issn| right.contains(issn)) {
                Identifiers::Same
            } else if !left.is_empty() && !right.is_empty() {
                Identifiers::Conflict
            } else {
                Identifiers::Unknown
            }
        },
        (E::Patent(x), E::Patent(y)) => compare(x.patent_number.as_deref(), y.patent_number.as_deref()),
        (E::Product(x), E::Product(y)) => compare(x.url.as_deref(), y.url.as_deref()),
        _ => Identifiers::Unknown,
    }
}

fn compare(a: Option<&str>, b: Option<&str>) -> Identifiers {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(x), Some(y)) if x.eq_ignore_ascii_case(y) => Identifiers::Same,
        (Some(_), Some(_)) => Identifiers::Conflict,
        _ => Identifiers::Unknown,
    }
}

impl Identifiers {
    fn or_else(self, next: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Unknown => next(),
            decided => decided,
        }
    }
}

/// Lowercased labels in every available language.
fn labels(entity: &CanonicalEntity) -> Vec<String> {
    let content: &MultilingualContent = match entity {
        CanonicalEntity::Person(_) => {
            return entity.label().map(|l| vec![l.to_lowercase()]).unwrap_or_default();
        },
        CanonicalEntity::OrgUnit(o) => &o.name,
        CanonicalEntity::Event(e) => &e.name,
        CanonicalEntity::Product(p) => &p.name,
        CanonicalEntity::Patent(p) => &p.title,
        CanonicalEntity::Publication(p) => &p.title,
        CanonicalEntity::PublicationSeries(s) => &s.title,
    };
    content
        .entries()
        .iter()
        .map(|e| e.text.to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PersonDto, PublicationSeriesDto};
    use crate::multilingual::{InMemoryLanguageTagRegistry, Normalizer};
    use crate::store::InMemoryStore;

    fn series(title: &str, issn: Option<&str>) -> CanonicalEntity {
        let registry = InMemoryLanguageTagRegistry::from_codes(["EN"]);
        CanonicalEntity::PublicationSeries(PublicationSeriesDto {
            title: Normalizer::new(&registry).normalize([("en", title)]),
            issn: issn.map(str::to_string),
            e_issn: None,
        })
    }

    fn person(last: &str, first: &str, orcid: Option<&str>) -> CanonicalEntity {
        CanonicalEntity::Person(PersonDto {
            last_name: Some(last.to_string()),
            first_name: Some(first.to_string()),
            orcid: orcid.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn test_shared_identifier_is_certain() {
        let matcher = DuplicateMatcher::new();
        let a = series("Physica A", Some("0378-4371"));
        let b = series("Physica A: Statistical Mechanics", Some("0378-4371"));
        assert_eq!(matcher.assess(&a, &b), Some(MatchConfidence::Certain));
    }

    #[test]
    fn test_conflicting_identifiers_never_match() {
        let matcher = DuplicateMatcher::new();
        let a = person("Petrović", "Ana", Some("0000-0001-0000-0001"));
        let b = person("Petrović", "Ana", Some("0000-0001-0000-0002"));
        assert_eq!(matcher.assess(&a, &b), None);
    }

    #[test]
    fn test_similar_labels_are_probable() {
        let matcher = DuplicateMatcher::new();
        let a = series("Journal of Applied Testing", None);
        let b = series("Journal of Applied Testing.", None);
        assert!(matches!(matcher.assess(&a, &b), Some(MatchConfidence::Probable(score)) if score > 0.93));

        let c = series("Annals of Mathematics", None);
        assert_eq!(matcher.assess(&a, &c), None);
    }

    #[test]
    fn test_different_kinds_never_match() {
        let matcher = DuplicateMatcher::new().with_threshold(0.0);
        assert_eq!(matcher.assess(&series("X", None), &person("X", "Y", None)), None);
    }

    #[test]
    fn test_find_candidates_scans_kind() {
        let store = InMemoryStore::new();
        let a = store.insert(None, series("Journal of Tests", Some("1234-5678")), None).unwrap();
        store.insert(None, series("Unrelated Review", None), None).unwrap();
        let c = store.insert(None, series("J. of Tests", Some("1234-5678")), None).unwrap();
        store.insert(None, person("Doe", "Jane", None), None).unwrap();

        let pairs = DuplicateMatcher::new()
            .find_candidates(&store, EntityKind::PublicationSeries)
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first, pairs[0].second), (a, c));
        assert_eq!(pairs[0].confidence, MatchConfidence::Certain);
    }
}
