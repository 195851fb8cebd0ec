// src/pipeline/source.rs

//! Pipeline for a single source: fetch, parse, drift check, ingest, log, alert.
//!
//! Never returns an error. Every failure ends up in the [`SourceOutcome`],
//! the scraping log and, where relevant, an alert.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, Config, LogEntry, RunStatus, SiteConfig, SourceError, SourceOutcome};
use crate::notify::{Alert, AlertDispatcher};
use crate::pipeline::drift::{DriftDetector, DriftVerdict};
use crate::pipeline::ingest::{IngestStats, ingest_all};
use crate::pipeline::retry::RetryPolicy;
use crate::services::{ParseContext, parser_for};
use crate::storage::Store;
use crate::utils::http::Fetcher;

/// Dependencies shared by every source of a run.
#[derive(Clone)]
pub struct SourcePipeline {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    alerts: Arc<AlertDispatcher>,
    policy: RetryPolicy,
    detector: DriftDetector,
}

impl SourcePipeline {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        let policy = RetryPolicy::from(&config.retry);
        let detector = DriftDetector::new(config.drift.clone());
        Self {
            config,
            fetcher,
            store,
            alerts,
            policy,
            detector,
        }
    }

    /// Fetch and parse with retry. Parse errors are not retried.
    pub async fn extract(&self, site: &SiteConfig, today: NaiveDate) -> Result<Vec<CandidateEvent>> {
        let ctx = ParseContext::new(site, &self.config, today)?;
        let parse = parser_for(site.kind);
        let ctx = &ctx;
        let fetcher = self.fetcher.as_ref();

        self.policy
            .run(move || async move {
                let body = fetcher.fetch(&site.url).await?;
                parse(&body, ctx)
            })
            .await
    }

    /// Past yields of the site. An unreadable log counts as no history.
    async fn history(&self, site: &str) -> Vec<usize> {
        match self
            .store
            .recent_success_counts(site, self.config.drift.window)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                log::warn!("[{}] Could not read run history: {}", site, e);
                Vec::new()
            }
        }
    }

    /// Run the whole pipeline for one source.
    pub async fn run(&self, site: &SiteConfig, today: NaiveDate) -> SourceOutcome {
        log::info!("[{}] Scraping {} ({})", site.name, site.url, site.kind.as_str());
        let mut outcome = SourceOutcome::new(&site.name);

        let candidates = match self.extract(site, today).await {
            Ok(candidates) => candidates,
            Err(error) => return self.fail(outcome, error).await,
        };
        outcome.events_found = candidates.len();
        log::info!("[{}] Found {} events", site.name, candidates.len());

        let history = self.history(&site.name).await;
        let verdict = self.detector.check(&candidates, &history);
        if let Err(error) = verdict.ensure_stable(&site.name) {
            outcome.structure_changed = true;
            return self.drifted(outcome, &verdict, error).await;
        }

        let (stats, last_error) = ingest_all(self.store.as_ref(), &site.name, &candidates).await;
        outcome.events_inserted = stats.inserted;
        outcome.duplicates = stats.duplicates;
        outcome.insert_failures = stats.failures;

        match (classify(&stats), last_error) {
            (RunStatus::Failure, Some(error)) => self.fail(outcome, error).await,
            (RunStatus::Partial, error) => {
                outcome.status = RunStatus::Partial;
                let entry = LogEntry::new(&site.name, RunStatus::Partial, outcome.events_found);
                let entry = match &error {
                    Some(e) => entry.with_error(e),
                    None => entry,
                };
                self.write_log(&entry).await;
                let alert = Alert::warning(
                    &site.name,
                    format!(
                        "{} of {} events could not be stored",
                        stats.failures,
                        stats.inserted + stats.failures
                    ),
                    Some(serde_json::json!({
                        "inserted": stats.inserted,
                        "failed": stats.failures,
                        "duplicates": stats.duplicates,
                    })),
                );
                self.alerts.dispatch(&alert).await;
                outcome
            }
            _ => {
                log::info!(
                    "[{}] Inserted {} new events ({} duplicates)",
                    site.name,
                    stats.inserted,
                    stats.duplicates
                );
                self.write_log(&LogEntry::new(&site.name, RunStatus::Success, outcome.events_found))
                    .await;
                outcome
            }
        }
    }

    async fn fail(&self, mut outcome: SourceOutcome, error: AppError) -> SourceOutcome {
        log::error!("[{}] Failed: {}", outcome.site, error);
        outcome.status = RunStatus::Failure;
        self.write_log(
            &LogEntry::new(&outcome.site, RunStatus::Failure, outcome.events_found).with_error(&error),
        )
        .await;
        self.alerts.dispatch(&Alert::error(&outcome.site, &error)).await;
        outcome.error = Some(SourceError::new(&outcome.site, &error));
        outcome
    }

    async fn drifted(
        &self,
        mut outcome: SourceOutcome,
        verdict: &DriftVerdict,
        error: AppError,
    ) -> SourceOutcome {
        outcome.status = RunStatus::Failure;
        self.write_log(
            &LogEntry::new(&outcome.site, RunStatus::Failure, outcome.events_found).with_error(&error),
        )
        .await;
        self.alerts
            .dispatch(&Alert::structure_change(&outcome.site, verdict))
            .await;
        outcome.error = Some(SourceError::new(&outcome.site, &error));
        outcome
    }

    async fn write_log(&self, entry: &LogEntry) {
        if let Err(e) = self.store.append_log(entry).await {
            log::warn!("[{}] Failed to write scraping log: {}", entry.site_name, e);
        }
    }
}

/// Status implied by the insert tallies.
fn classify(stats: &IngestStats) -> RunStatus {
    match (stats.inserted, stats.failures) {
        (_, 0) => RunStatus::Success,
        (0, _) => RunStatus::Failure,
        _ => RunStatus::Partial,
    }
}
