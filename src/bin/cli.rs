//! Machi Crawler CLI
//!
//! Local execution entry point. For AWS Lambda, use `machi-crawler-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use machi_crawler::{
    config::load_all,
    error::{AppError, Result},
    models::{Config, SiteConfig, SourceKind},
    notify::AlertDispatcher,
    pipeline,
    services::{ParseContext, parser_for},
    storage::{MemoryStore, Store, open_store},
    utils::http::{Fetcher, HttpFetcher},
};

/// Machi - Local Event Crawler
#[derive(Parser, Debug)]
#[command(
    name = "machi-crawler",
    version,
    about = "Collects local event listings into a shared event store"
)]
struct Cli {
    /// Path to the configuration file (default: data/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the stored events with a fresh scrape of all sources
    Run {
        /// Only scrape these sources (repeatable)
        #[arg(long = "site")]
        sites: Vec<String>,

        /// Use an in-memory store and send no alerts
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration and the site table
    Validate,

    /// List configured sources
    Sites,

    /// Parse one source and print the candidates without storing them
    Probe {
        /// Source name
        #[arg(long)]
        site: String,

        /// Parse this file instead of fetching the source URL
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Machi Crawler starting...");

    let config = load_all(cli.config.as_deref())?;
    let registry = config.registry()?;

    match cli.command {
        Command::Run { sites, dry_run } => {
            let registry = registry.filter(&sites)?;

            let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.crawler)?);
            let store: Arc<dyn Store>;
            let alerts;
            if dry_run {
                log::info!("Dry run: using in-memory store, alerts disabled");
                store = Arc::new(MemoryStore::new());
                alerts = AlertDispatcher::default();
            } else {
                store = open_store(&config.store, &config.crawler)?;
                alerts =
                    AlertDispatcher::from_settings(&config.alerts, config.crawler.local_offset())?;
            }

            let report = pipeline::run_batch(
                Arc::new(config),
                &registry,
                fetcher,
                store,
                Arc::new(alerts),
            )
            .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            log::info!(
                "✓ Config OK ({} sources: {} feed, {} html)",
                registry.len(),
                registry.count_by_kind(SourceKind::Feed),
                registry.count_by_kind(SourceKind::Html)
            );
            log::info!("All validations passed!");
        }

        Command::Sites => {
            for site in &registry {
                println!(
                    "{:<4}  {:<24}  {:<8}  {}",
                    site.kind.as_str(),
                    site.name,
                    site.region,
                    site.url
                );
            }
        }

        Command::Probe { site, file } => {
            let site = registry
                .get(&site)
                .ok_or_else(|| AppError::config(format!("unknown site '{site}'")))?;
            let body = match file {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => HttpFetcher::new(&config.crawler)?.fetch(&site.url).await?,
            };
            probe(&config, site, &body)?;
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Parse a document as `site` would be parsed and print the candidates.
fn probe(config: &Config, site: &SiteConfig, body: &str) -> Result<()> {
    let ctx = ParseContext::new(site, config, config.crawler.today())?;
    let events = parser_for(site.kind)(body, &ctx)?;
    log::info!("[{}] {} candidates", site.name, events.len());
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}
