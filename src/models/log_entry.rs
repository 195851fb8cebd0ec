// src/models/log_entry.rs

//! Audit record written once per source per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

/// Outcome class of one source run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failure => "failure",
        }
    }
}

/// Row of the `scraping_logs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub site_name: String,
    pub status: RunStatus,
    pub events_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(site_name: impl Into<String>, status: RunStatus, events_count: usize) -> Self {
        Self {
            site_name: site_name.into(),
            status,
            events_count,
            error_message: None,
            error_type: None,
            stack_trace: None,
            created_at: Utc::now(),
        }
    }

    /// Attach error details.
    pub fn with_error(mut self, error: &AppError) -> Self {
        self.error_message = Some(error.to_string());
        self.error_type = Some(error.kind());
        self.stack_trace = Some(error.trace());
        self
    }

    /// Whether this entry belongs to the drift baseline.
    pub fn is_baseline_sample(&self) -> bool {
        self.status == RunStatus::Success && self.events_count > 0
    }
}
