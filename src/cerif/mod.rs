//! CERIF XML dialect layer.
//!
//! Turns the metadata payload of an OAI-PMH record into the typed schema model
//! of [`crate::model::cerif`]. Both supported CERIF 1.1-profile dialects are
//! accepted without the caller naming one; see [`dialect`] for how they differ.
//!
//! # Examples
//!
//! ```ignore
//! use cerif_harvest::cerif::read_entity_str;
//! use cerif_harvest::model::CerifEntity;
//!
//! let entity = read_entity_str(r#"<OrgUnit id="o1"><Name lang="en">Faculty</Name></OrgUnit>"#)?;
//! assert!(matches!(entity, CerifEntity::OrgUnit(_)));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod dialect;
mod reader;

pub use dialect::{CerifField, Dialect, DialectMapping};
pub use reader::{read_entity, read_entity_str};

use crate::error::ConversionError;
use crate::model::HarvestedRecord;
use crate::oai::RawRecord;

/// Converts a raw OAI record into a [`HarvestedRecord`].
///
/// Deleted records and identifier-only listings carry no payload and yield a
/// record without an entity.
///
/// # Errors
///
/// Returns the [`read_entity`] errors for a payload that is not a valid
/// CERIF entity.
pub fn harvested_record(raw: RawRecord) -> Result<HarvestedRecord, ConversionError> {
    let entity = match (&raw.metadata, raw.header.deleted) {
        (Some(metadata), false) => Some(read_entity(metadata, &raw.header.identifier)?),
        _ => None,
    };
    Ok(HarvestedRecord {
        header: raw.header,
        entity,
    })
}
