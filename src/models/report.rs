// src/models/report.rs

//! Per-source outcomes and the aggregated batch report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};
use crate::models::RunStatus;

/// Error summary carried in outcomes and the batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub site: String,
    pub error: String,
    #[serde(rename = "errorType")]
    pub error_type: ErrorKind,
}

impl SourceError {
    pub fn new(site: impl Into<String>, error: &AppError) -> Self {
        Self {
            site: site.into(),
            error: error.to_string(),
            error_type: error.kind(),
        }
    }
}

/// Result of one source pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub site: String,
    pub status: RunStatus,
    pub events_found: usize,
    pub events_inserted: usize,
    pub duplicates: usize,
    pub insert_failures: usize,
    pub structure_changed: bool,
    pub error: Option<SourceError>,
}

impl SourceOutcome {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            status: RunStatus::Success,
            events_found: 0,
            events_inserted: 0,
            duplicates: 0,
            insert_failures: 0,
            structure_changed: false,
            error: None,
        }
    }

    /// Partial runs still count as successful sources.
    pub fn is_success(&self) -> bool {
        self.status != RunStatus::Failure
    }
}

/// JSON document returned by the batch trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total_sites: usize,
    pub successful_sites: usize,
    pub failed_sites: usize,
    pub total_events: usize,
    pub new_events: usize,
    pub structure_changes: usize,
    pub errors: Vec<SourceError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(skip)]
    pub sources: Vec<SourceOutcome>,
}

impl BatchReport {
    /// Aggregate per-source outcomes.
    pub fn from_outcomes(
        sources: Vec<SourceOutcome>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let successful_sites = sources.iter().filter(|o| o.is_success()).count();
        Self {
            total_sites: sources.len(),
            successful_sites,
            failed_sites: sources.len() - successful_sites,
            total_events: sources.iter().map(|o| o.events_found).sum(),
            new_events: sources.iter().map(|o| o.events_inserted).sum(),
            structure_changes: sources.iter().filter(|o| o.structure_changed).count(),
            errors: sources.iter().filter_map(|o| o.error.clone()).collect(),
            started_at,
            finished_at,
            sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_aggregation_and_schema() {
        let ok = SourceOutcome {
            events_found: 4,
            events_inserted: 3,
            duplicates: 1,
            ..SourceOutcome::new("a")
        };
        let drifted = SourceOutcome {
            status: RunStatus::Failure,
            events_found: 1,
            structure_changed: true,
            error: Some(SourceError::new(
                "b",
                &AppError::StructureChanged {
                    reason: "drop".into(),
                },
            )),
            ..SourceOutcome::new("b")
        };
        let now = Utc::now();
        let report = BatchReport::from_outcomes(vec![ok, drifted], now, now);

        assert_eq!(report.successful_sites, 1);
        assert_eq!(report.failed_sites, 1);
        assert_eq!(report.total_events, 5);
        assert_eq!(report.new_events, 3);
        assert_eq!(report.structure_changes, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalSites"], 2);
        assert_eq!(json["newEvents"], 3);
        assert_eq!(json["errors"][0]["errorType"], "parsing");
        assert_eq!(json["errors"][0]["site"], "b");
        assert!(json.get("sources").is_none());
    }
}
