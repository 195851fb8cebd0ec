// src/lambda/mod.rs

//! AWS Lambda batch trigger.
//!
//! Everything the handler needs is built once per cold start in
//! [`LambdaState::from_config`]:
//! 1. Opens the configured event store
//! 2. Builds the HTTP fetcher and the alert channels
//!
//! Each invocation then runs one full batch and returns its report.

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::models::{BatchReport, Config};
use crate::notify::AlertDispatcher;
use crate::pipeline::run_batch;
use crate::storage::{Store, open_store};
use crate::utils::http::{Fetcher, HttpFetcher};

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct ScrapeRequest {
    /// Restrict the run to these sources (all sources if not specified)
    #[serde(default)]
    pub sites: Option<Vec<String>>,
}

/// Lambda response payload.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ScrapeResponse {
    Report(BatchReport),
    Failed { success: bool, error: String },
}

impl ScrapeResponse {
    fn failed(error: impl ToString) -> Self {
        Self::Failed {
            success: false,
            error: error.to_string(),
        }
    }
}

/// Process-wide dependencies, built at cold start.
pub struct LambdaState {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    alerts: Arc<AlertDispatcher>,
}

impl LambdaState {
    pub fn from_config(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.crawler)?);
        let store = open_store(&config.store, &config.crawler)?;
        let alerts = AlertDispatcher::from_settings(&config.alerts, config.crawler.local_offset())?;
        if alerts.channel_count() == 0 {
            info!("No alert channels configured");
        }
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            store,
            alerts: Arc::new(alerts),
        })
    }
}

/// Main Lambda handler function.
#[instrument(skip(state, event))]
pub async fn handler(
    state: Arc<LambdaState>,
    event: LambdaEvent<ScrapeRequest>,
) -> std::result::Result<ScrapeResponse, LambdaError> {
    let (request, _context) = event.into_parts();
    info!("Starting scrape: sites={:?}", request.sites);

    match run_scrape(&state, &request).await {
        Ok(report) => {
            info!(
                "Scrape completed: {}/{} sources ok, {} new events",
                report.successful_sites, report.total_sites, report.new_events
            );
            Ok(ScrapeResponse::Report(report))
        }
        Err(e) => {
            error!("Scrape failed: {}", e);
            Ok(ScrapeResponse::failed(e))
        }
    }
}

async fn run_scrape(state: &LambdaState, request: &ScrapeRequest) -> Result<BatchReport> {
    let registry = state.config.registry()?;
    let registry = match &request.sites {
        Some(names) if !names.is_empty() => registry.filter(names)?,
        _ => registry,
    };

    run_batch(
        Arc::clone(&state.config),
        &registry,
        Arc::clone(&state.fetcher),
        Arc::clone(&state.store),
        Arc::clone(&state.alerts),
    )
    .await
}
