//! Error types for harvesting, conversion and merge operations.
//!
//! This module provides the crate-wide [`HarvestError`] type, the per-record
//! [`ConversionError`] collected into run reports, the [`StoreError`] raised by
//! persistence collaborators, and the [`Result`] convenience type.

use serde::Serialize;
use thiserror::Error;

use crate::model::{EntityId, EntityKind};

/// Error type for all harvesting library operations.
///
/// Protocol and merge errors are raised synchronously to the caller.
/// Conversion errors are normally collected into a run report instead; the
/// [`HarvestError::Conversion`] variant exists for single-record entry points.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Network failure, timeout, OAI error response or malformed response.
    ///
    /// The caller may retry the same page.
    #[error("Protocol error from handler '{handler}': {message}")]
    Protocol {
        /// Name of the handler that was being queried.
        handler: String,
        /// OAI-PMH error code when the repository answered with one.
        code: Option<String>,
        /// Human readable description.
        message: String,
    },

    /// The handler name is not configured. Never retried.
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    /// A single record could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A merge request was rejected before any write happened.
    #[error("Merge validation failed: {0}")]
    MergeValidation(String),

    /// A merge failed part way and its updates were rolled back.
    #[error("Merge of {source_id} into {target_id} aborted: {message}")]
    MergeConsistency {
        /// Entity that was being merged away.
        source_id: EntityId,
        /// Entity that was receiving the dependents.
        target_id: EntityId,
        /// What failed.
        message: String,
        /// Whether every partial update could be restored.
        rolled_back: bool,
    },

    /// The persistence collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error from reading configuration or fixtures.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true when retrying the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Protocol { code, .. } => code.is_none(),
            _ => false,
        }
    }

    pub(crate) fn protocol(handler: &str, message: impl Into<String>) -> Self {
        Self::Protocol {
            handler: handler.to_string(),
            code: None,
            message: message.into(),
        }
    }
}

/// Per-record conversion failure.
///
/// A record that fails conversion is skipped and reported; the run carries on
/// with the remaining records.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionError {
    /// The organisation unit is transitively part of itself.
    #[error("PartOf cycle detected at '{external_id}': {}", chain.join(" -> "))]
    CycleDetected {
        /// Organisation unit that sits on the cycle.
        external_id: String,
        /// External ids along the cycle, starting and ending at `external_id`.
        chain: Vec<String>,
    },

    /// A required element is absent or empty.
    #[error("Record '{external_id}' is missing required field '{field}'")]
    MissingField {
        /// Identifier of the offending record.
        external_id: String,
        /// Name of the missing element.
        field: String,
    },

    /// The metadata root is not a supported CERIF entity.
    #[error("Record '{external_id}' has unsupported entity element '{element}'")]
    UnsupportedEntity {
        /// OAI identifier of the offending record.
        external_id: String,
        /// Local name of the root metadata element.
        element: String,
    },

    /// A committed record would change kind (publication to series or back).
    #[error("Loaded record '{external_id}' is a {stored} but was harvested as a {harvested}")]
    KindChanged {
        /// External id of the record.
        external_id: String,
        /// Kind of the stored record.
        stored: EntityKind,
        /// Kind of the harvested record.
        harvested: EntityKind,
    },

    /// The metadata payload could not be read.
    #[error("Record '{external_id}' has malformed metadata: {message}")]
    MalformedMetadata {
        /// Identifier of the offending record.
        external_id: String,
        /// Reader diagnostic.
        message: String,
    },
}

impl ConversionError {
    /// External identifier of the record this error belongs to.
    #[must_use]
    pub fn external_id(&self) -> &str {
        match self {
            Self::CycleDetected { external_id, .. }
            | Self::MissingField { external_id, .. }
            | Self::UnsupportedEntity { external_id, .. }
            | Self::KindChanged { external_id, .. }
            | Self::MalformedMetadata { external_id, .. } => external_id,
        }
    }

    /// Returns true for the cycle-detection subtype.
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CycleDetected { .. })
    }
}

/// Error raised by persistence collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No entity with this id exists.
    #[error("Entity {0} not found")]
    NotFound(EntityId),

    /// The stored reference slot does not point at the expected entity.
    #[error("Entity {holder} has no reference to {expected}")]
    StaleReference {
        /// Entity holding the reference.
        holder: EntityId,
        /// Entity the reference was expected to point at.
        expected: EntityId,
    },

    /// Backend failure (connection lost, lock poisoned, injected fault).
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for [`std::result::Result`] with [`HarvestError`].
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_retryable() {
        let err = HarvestError::protocol("repoX", "timed out");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Protocol error from handler 'repoX': timed out"
        );

        let err = HarvestError::Protocol {
            handler: "repoX".to_string(),
            code: Some("badResumptionToken".to_string()),
            message: "expired".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_handler_not_retryable() {
        let err = HarvestError::UnknownHandler("nope".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Unknown handler: nope");
    }

    #[test]
    fn test_cycle_error_display() {
        let err = ConversionError::CycleDetected {
            external_id: "A".to_string(),
            chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert!(err.is_cycle());
        assert_eq!(err.external_id(), "A");
        assert_eq!(err.to_string(), "PartOf cycle detected at 'A': A -> B -> A");
    }

    #[test]
    fn test_conversion_error_wraps() {
        let err: HarvestError = ConversionError::MissingField {
            external_id: "p1".to_string(),
            field: "id".to_string(),
        }
        .into();
        assert!(matches!(err, HarvestError::Conversion(_)));
    }
}
