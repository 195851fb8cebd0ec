// src/models/mod.rs

//! Domain models for the event crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod log_entry;
mod report;
mod site;

// Re-export all public types
pub use config::{
    AlertSettings, CleaningConfig, Config, CrawlerConfig, DriftSettings, ParsingConfig,
    Replacement, RetrySettings, StoreBackend, StoreConfig,
};
pub use event::{CandidateEvent, DedupKey, EventTime};
pub use log_entry::{LogEntry, RunStatus};
pub use report::{BatchReport, SourceError, SourceOutcome};
pub use site::{FieldSelectors, SiteConfig, SiteRegistry, SourceKind};
