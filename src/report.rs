//! Harvest run reports.
//!
//! A run that skipped records is still a success: its [`RunReport`] lists the
//! skipped records with their errors, the links that stayed empty, and the
//! identifiers the repository reported as deleted.

use serde::Serialize;

use crate::convert::UnresolvedLink;
use crate::error::{ConversionError, HarvestError, Result};
use crate::model::RunId;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every page was fetched and converted.
    Completed,
    /// Cancellation was requested; the pages fetched before it were converted.
    Cancelled,
}

/// A record that was not converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// External id of the record (the OAI identifier when the payload had no id).
    pub external_id: String,
    /// Why it was skipped.
    pub error: ConversionError,
}

/// Outcome of one harvest run against one handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Run id, also stored in the provenance of every record it imported.
    pub run: RunId,
    /// Handler the run harvested.
    pub handler: String,
    /// How the run ended.
    pub status: RunStatus,
    /// Pages converted.
    pub pages: usize,
    /// Records inserted.
    pub created: usize,
    /// Unloaded records replaced.
    pub updated: usize,
    /// Loaded records whose display fields were refreshed.
    pub display_only: usize,
    /// Records not converted.
    pub skipped: Vec<SkippedRecord>,
    /// Links whose target was missing or of the wrong kind.
    pub unresolved: Vec<UnresolvedLink>,
    /// OAI identifiers reported deleted upstream.
    pub withdrawn: Vec<String>,
}

impl RunReport {
    /// An empty, completed report.
    pub fn new(run: RunId, handler: impl Into<String>) -> Self {
        Self {
            run,
            handler: handler.into(),
            status: RunStatus::Completed,
            pages: 0,
            created: 0,
            updated: 0,
            display_only: 0,
            skipped: Vec::new(),
            unresolved: Vec::new(),
            withdrawn: Vec::new(),
        }
    }

    /// Records written by the run.
    #[must_use]
    pub fn converted(&self) -> usize {
        self.created + self.updated + self.display_only
    }

    /// Whether any record was skipped.
    #[must_use]
    pub fn has_skips(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Config`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HarvestError::Config(format!("cannot serialize run report: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::UnresolvedReason;
    use crate::model::ReferenceSlot;

    #[test]
    fn test_report_json() {
        let mut report = RunReport::new(RunId::new(), "repoX");
        report.created = 2;
        report.skipped.push(SkippedRecord {
            external_id: "A".to_string(),
            error: ConversionError::CycleDetected {
                external_id: "A".to_string(),
                chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
            },
        });
        report.unresolved.push(UnresolvedLink {
            holder: "prod1".to_string(),
            slot: ReferenceSlot::Creator,
            target: "ghost".to_string(),
            reason: UnresolvedReason::NotFound,
        });

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["created"], 2);
        assert_eq!(json["skipped"][0]["error"]["type"], "cycle_detected");
        assert_eq!(json["unresolved"][0]["reason"]["reason"], "not_found");
        assert!(report.has_skips());
        assert_eq!(report.converted(), 2);
    }
}
