//! AWS Lambda entry point for Machi Crawler
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//!
//! ## Environment Variables
//!
//! - `MACHI_CONFIG`: Path to the bundled configuration file (default: `data/config.toml`)
//! - `SLACK_WEBHOOK_URL`, `ALERT_WEBHOOK_URL`: Alert channels
//! - `STORE_URL`, `STORE_API_KEY`, `STORE_DIR`: Event store
//! - `RUST_LOG`: Log level (e.g., `info`, `debug`)

use std::path::PathBuf;
use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use machi_crawler::config::load_all;
use machi_crawler::lambda::{LambdaState, handler};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Machi Lambda Crawler starting...");

    let config_path = std::env::var("MACHI_CONFIG").ok().map(PathBuf::from);
    let config = load_all(config_path.as_deref())?;
    let state = Arc::new(LambdaState::from_config(config)?);

    lambda_runtime::run(service_fn(move |event| handler(Arc::clone(&state), event))).await
}
