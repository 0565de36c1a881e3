#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # cerif-harvest: CERIF harvesting and reconciliation
//!
//! The crate pulls CERIF records from OAI-PMH repositories, converts them into
//! canonical entities with import provenance, and merges duplicates.
//!
//! ## Pipeline
//!
//! ```text
//! OaiClient ──pages──▶ Converter ──stage──▶ finish() ──▶ EntityStore
//!  (oai)               (cerif + convert)     cycles, upsert,
//!                                            links, ancestors
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Handler and run configuration (TOML)
//! - [`oai`] — OAI-PMH requests, responses, transport and paging
//! - [`xml`] — Namespace-aware element tree over `quick-xml`
//! - [`cerif`] — Dialect detection and CERIF payload reading
//! - [`model`] — CERIF records, canonical entities, provenance
//! - [`multilingual`] — Language tags and multilingual normalization
//! - [`convert`] — Conversion runs, reference resolution, hierarchy checks
//! - [`store`] — Entity and reference repository traits, in-memory store
//! - [`merge`] — Duplicate matching and atomic merges
//! - [`harvest`] — Harvest orchestration, cancellation, multi-handler runs
//! - [`report`] — Run reports
//! - [`error`] — Error types and result type

pub mod cerif;
pub mod config;
pub mod convert;
pub mod error;
pub mod harvest;
pub mod merge;
pub mod model;
pub mod multilingual;
pub mod oai;
pub mod report;
pub mod store;
pub mod xml;

pub use config::{HandlerConfig, HarvestConfig};
pub use convert::Converter;
pub use error::{ConversionError, HarvestError, Result, StoreError};
pub use harvest::{CancellationToken, HarvestJob, HarvestOutcome, Harvester};
pub use merge::{DuplicateMatcher, MergeEngine, MergeOutcome};
pub use model::{CanonicalEntity, EntityId, EntityKind, RunId, SourceKey, UserId};
pub use multilingual::{InMemoryLanguageTagRegistry, LanguageTagRegistry, MultilingualContent};
pub use oai::{HttpTransport, OaiClient, Transport};
pub use report::{RunReport, RunStatus};
pub use store::{EntityStore, InMemoryStore, ReferenceRepository};
