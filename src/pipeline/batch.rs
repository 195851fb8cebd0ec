// src/pipeline/batch.rs

//! Batch orchestration across every registered source.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{BatchReport, Config, SiteRegistry};
use crate::notify::AlertDispatcher;
use crate::pipeline::source::SourcePipeline;
use crate::storage::Store;
use crate::utils::http::Fetcher;

/// Replace the stored event set with a fresh scrape of `registry`.
///
/// The existing events are deleted before any source runs; a failed delete
/// aborts the batch. After that, sources run with bounded concurrency and
/// one failing source never affects another.
pub async fn run_batch(
    config: Arc<Config>,
    registry: &SiteRegistry,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    alerts: Arc<AlertDispatcher>,
) -> Result<BatchReport> {
    let started_at = Utc::now();
    let concurrency = config.crawler.max_concurrent.max(1);
    let today = config.crawler.today();
    log::info!(
        "Starting batch: {} sources, concurrency {}",
        registry.len(),
        concurrency
    );

    log::info!("Clearing existing events");
    store.clear_events().await?;

    let pipeline = SourcePipeline::new(config, fetcher, store, alerts);
    let outcomes: Vec<_> = stream::iter(registry.iter())
        .map(|site| pipeline.run(site, today))
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let report = BatchReport::from_outcomes(outcomes, started_at, Utc::now());
    log::info!(
        "Batch finished: {}/{} sources succeeded, {} events found, {} new, {} structure changes",
        report.successful_sites,
        report.total_sites,
        report.total_events,
        report.new_events,
        report.structure_changes
    );
    Ok(report)
}
