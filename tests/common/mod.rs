//! Common test helpers shared across the integration suites.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use cerif_harvest::config::{HandlerConfig, HarvestConfig};
use cerif_harvest::model::EntityId;
use cerif_harvest::multilingual::InMemoryLanguageTagRegistry;
use cerif_harvest::oai::{FetchResult, Transport, TransportError};
use cerif_harvest::store::{InMemoryStore, Reference, ReferenceRepository, StoreResult};
use cerif_harvest::StoreError;

pub const REPO_X: &str = "https://repo-x.example.org/oai";

/// Configuration with the single handler `repoX`.
pub fn config() -> HarvestConfig {
    HarvestConfig::new().with_handler(HandlerConfig::new("repoX", REPO_X))
}

/// Registry with English and Serbian.
pub fn registry() -> InMemoryLanguageTagRegistry {
    InMemoryLanguageTagRegistry::from_codes(["EN", "SR"])
}

/// Transport answering `ListRecords` by resumption token.
///
/// The first page is keyed by the empty string. Answers are reusable, so the
/// same script serves repeated harvests.
#[derive(Debug, Default)]
pub struct MockTransport {
    pages: HashMap<String, String>,
    requests: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers the request carrying `token` (`""` for the first page).
    pub fn page(mut self, token: &str, body: String) -> Self {
        self.pages.insert(token.to_string(), body);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn fetch(&self, _base_url: &str, params: &[(&'static str, String)]) -> FetchResult {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let token = params
            .iter()
            .find(|(name, _)| *name == "resumptionToken")
            .map_or("", |(_, value)| value.as_str());
        self.pages
            .get(token)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("no page for token '{token}'")))
    }
}

/// One `<record>` with header and CERIF payload.
pub fn record(identifier: &str, payload: &str) -> String {
    format!(
        "<record><header><identifier>{identifier}</identifier><datestamp>2024-03-01</datestamp></header>\
         <metadata>{payload}</metadata></record>"
    )
}

/// A header-only record marked deleted.
pub fn deleted(identifier: &str) -> String {
    format!(
        r#"<record><header status="deleted"><identifier>{identifier}</identifier><datestamp>2024-03-02</datestamp></header></record>"#
    )
}

/// A `ListRecords` response envelope.
pub fn list_records(records: &[String], token: Option<&str>) -> String {
    let token = token.map_or_else(String::new, |t| {
        format!(r#"<resumptionToken completeListSize="3">{t}</resumptionToken>"#)
    });
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2024-03-03T10:00:00Z</responseDate>
  <request verb="ListRecords">{REPO_X}</request>
  <ListRecords>{}{token}</ListRecords>
</OAI-PMH>"#,
        records.concat()
    )
}

/// Schema-qualified person.
pub fn person(id: &str, family: &str, first: &str) -> String {
    format!(
        r#"<Person xmlns="https://www.openaire.eu/cerif-profile/1.1/" id="{id}">
  <PersonName><FamilyName>{family}</FamilyName><FirstName>{first}</FirstName></PersonName>
</Person>"#
    )
}

/// Legacy (prefixed) person.
pub fn legacy_person(id: &str, family: &str, first: &str) -> String {
    format!(
        r#"<cerif:Person xmlns:cerif="https://www.openaire.eu/cerif-profile/1.1/" id="{id}">
  <cerif:PersonName><cerif:FamilyNames>{family}</cerif:FamilyNames><cerif:FirstNames>{first}</cerif:FirstNames></cerif:PersonName>
</cerif:Person>"#
    )
}

/// Schema-qualified product with creators linked by person id.
pub fn product(id: &str, name: &str, creators: &[&str]) -> String {
    let creators: String = creators
        .iter()
        .map(|person| format!(r#"<Creator><DisplayName>{person}</DisplayName><Person id="{person}"/></Creator>"#))
        .collect();
    format!(
        r#"<Product id="{id}"><Name lang="en">{name}</Name><Creators>{creators}</Creators></Product>"#
    )
}

/// Schema-qualified org unit, optionally part of another.
pub fn org_unit(id: &str, name: &str, parent: Option<&str>) -> String {
    let part_of = parent.map_or_else(String::new, |p| format!(r#"<PartOf><OrgUnit id="{p}"/></PartOf>"#));
    format!(r#"<OrgUnit id="{id}"><Name lang="en">{name}</Name>{part_of}</OrgUnit>"#)
}

/// Reference repository that fails on the `fail_on`-th repoint (1-based).
#[derive(Debug)]
pub struct FaultyReferences {
    inner: Arc<InMemoryStore>,
    fail_on: usize,
    calls: Mutex<usize>,
}

impl FaultyReferences {
    pub fn new(inner: Arc<InMemoryStore>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            calls: Mutex::new(0),
        }
    }
}

impl ReferenceRepository for FaultyReferences {
    fn dependents_of(&self, target: EntityId) -> StoreResult<Vec<Reference>> {
        self.inner.dependents_of(target)
    }

    fn repoint(&self, reference: &Reference, to: EntityId) -> StoreResult<()> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        if *calls == self.fail_on {
            return Err(StoreError::Backend("injected fault".to_string()));
        }
        self.inner.repoint(reference, to)
    }
}

/// Reference repository that stops when it is asked to rewrite `blocked`:
/// it meets the test at `entered`, waits for `resume`, then fails.
#[derive(Debug)]
pub struct PausingReferences {
    inner: Arc<InMemoryStore>,
    blocked: EntityId,
    pub entered: Barrier,
    pub resume: Barrier,
}

impl PausingReferences {
    pub fn new(inner: Arc<InMemoryStore>, blocked: EntityId) -> Self {
        Self {
            inner,
            blocked,
            entered: Barrier::new(2),
            resume: Barrier::new(2),
        }
    }
}

impl ReferenceRepository for PausingReferences {
    fn dependents_of(&self, target: EntityId) -> StoreResult<Vec<Reference>> {
        self.inner.dependents_of(target)
    }

    fn repoint(&self, reference: &Reference, to: EntityId) -> StoreResult<()> {
        if reference.holder == self.blocked {
            self.entered.wait();
            self.resume.wait();
            return Err(StoreError::Backend("holder unavailable".to_string()));
        }
        self.inner.repoint(reference, to)
    }
}
