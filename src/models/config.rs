// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::site::{SiteConfig, SiteRegistry, default_sites};
use crate::utils::normalize_whitespace;

/// Root application configuration.
///
/// Built once at start-up and passed by reference; nothing downstream reads
/// the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Backoff for fetch-and-parse
    #[serde(default)]
    pub retry: RetrySettings,

    /// Structural drift thresholds
    #[serde(default)]
    pub drift: DriftSettings,

    /// Extraction limits
    #[serde(default)]
    pub parsing: ParsingConfig,

    /// Text preprocessing settings
    #[serde(default)]
    pub cleaning: CleaningConfig,

    /// Event store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Operator alert channels
    #[serde(default)]
    pub alerts: AlertSettings,

    /// Source definitions
    #[serde(default = "default_sites")]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply secrets and deployment settings from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("SLACK_WEBHOOK_URL") {
            self.alerts.slack_webhook_url = Some(url);
        }
        if let Some(url) = lookup("ALERT_WEBHOOK_URL") {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(url) = lookup("STORE_URL") {
            self.store.url = Some(url);
            self.store.backend = StoreBackend::Rest;
        }
        if let Some(key) = lookup("STORE_API_KEY") {
            self.store.api_key = Some(key);
        }
        if let Some(dir) = lookup("STORE_DIR") {
            self.store.dir = PathBuf::from(dir);
        }
    }

    /// Build the site registry from the configured sources.
    pub fn registry(&self) -> Result<SiteRegistry> {
        SiteRegistry::new(self.sites.clone())
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if !(-12..=14).contains(&self.crawler.utc_offset_hours) {
            return Err(AppError::validation(
                "crawler.utc_offset_hours must be within -12..=14",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::validation("retry.max_attempts must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(AppError::validation("retry.jitter_ratio must be within 0..=1"));
        }
        if self.drift.min_samples == 0 || self.drift.window < self.drift.min_samples {
            return Err(AppError::validation(
                "drift.window must be >= drift.min_samples > 0",
            ));
        }
        for (name, ratio) in [
            ("drift.min_ratio_of_mean", self.drift.min_ratio_of_mean),
            ("drift.max_invalid_ratio", self.drift.max_invalid_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(AppError::validation(format!("{name} must be within (0, 1]")));
            }
        }
        if self.parsing.max_title_chars == 0 {
            return Err(AppError::validation("parsing.max_title_chars must be > 0"));
        }
        if self.store.backend == StoreBackend::Rest && self.store.url.is_none() {
            return Err(AppError::validation("store.url is required for the rest backend"));
        }
        if self.sites.is_empty() {
            return Err(AppError::validation("No sites defined"));
        }
        self.registry()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            retry: RetrySettings::default(),
            drift: DriftSettings::default(),
            parsing: ParsingConfig::default(),
            cleaning: CleaningConfig::default(),
            store: StoreConfig::default(),
            alerts: AlertSettings::default(),
            sites: default_sites(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-fetch timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum number of sources processed at once
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Offset of the sources' local calendar from UTC
    #[serde(default = "defaults::utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl CrawlerConfig {
    /// Fixed offset of the sources' local calendar.
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Today's date on the sources' local calendar.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.local_offset()).date_naive()
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            utc_offset_hours: defaults::utc_offset_hours(),
        }
    }
}

/// Retry and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter bound as a fraction of the exponential delay
    #[serde(default = "defaults::jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_ratio: defaults::jitter_ratio(),
        }
    }
}

/// Structural drift thresholds.
///
/// The values are heuristics carried over from operation of the sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSettings {
    /// Number of past successful runs consulted
    #[serde(default = "defaults::drift_window")]
    pub window: usize,

    /// Samples required before drift can be asserted
    #[serde(default = "defaults::drift_min_samples")]
    pub min_samples: usize,

    /// Yields below this fraction of the historical mean are drift
    #[serde(default = "defaults::drift_min_ratio")]
    pub min_ratio_of_mean: f64,

    /// Share of implausible candidates above which the batch is drift
    #[serde(default = "defaults::drift_max_invalid")]
    pub max_invalid_ratio: f64,

    #[serde(default = "defaults::drift_min_title")]
    pub min_title_chars: usize,

    #[serde(default = "defaults::max_title_chars")]
    pub max_title_chars: usize,
}

impl Default for DriftSettings {
    fn default() -> Self {
        Self {
            window: defaults::drift_window(),
            min_samples: defaults::drift_min_samples(),
            min_ratio_of_mean: defaults::drift_min_ratio(),
            max_invalid_ratio: defaults::drift_max_invalid(),
            min_title_chars: defaults::drift_min_title(),
            max_title_chars: defaults::max_title_chars(),
        }
    }
}

/// Extraction limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Longer "titles" mean a mis-selected container
    #[serde(default = "defaults::max_title_chars")]
    pub max_title_chars: usize,

    /// Detail text is truncated to this many characters
    #[serde(default = "defaults::max_detail_chars")]
    pub max_detail_chars: usize,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            max_title_chars: defaults::max_title_chars(),
            max_detail_chars: defaults::max_detail_chars(),
        }
    }
}

/// Text cleaning/preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Patterns to remove from titles
    #[serde(default = "defaults::title_remove_patterns")]
    pub title_remove_patterns: Vec<String>,

    /// Text replacements to apply to dates
    #[serde(default)]
    pub date_replacements: Vec<Replacement>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            title_remove_patterns: defaults::title_remove_patterns(),
            date_replacements: Vec::new(),
        }
    }
}

impl CleaningConfig {
    /// Clean text by removing patterns and applying replacements.
    fn clean(&self, text: &str, patterns: &[String], replacements: &[Replacement]) -> String {
        let mut result = normalize_whitespace(text);

        for pattern in patterns {
            result = result.replace(pattern, "");
        }

        for r in replacements {
            result = result.replace(&r.from, &r.to);
        }

        normalize_whitespace(&result)
    }

    /// Clean a title string.
    pub fn clean_title(&self, text: &str) -> String {
        self.clean(text, &self.title_remove_patterns, &[])
    }

    /// Clean a date string.
    pub fn clean_date(&self, text: &str) -> String {
        self.clean(text, &[], &self.date_replacements)
    }
}

/// A text replacement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// Which event store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files in `store.dir`
    Local,
    /// PostgREST-compatible HTTP API
    Rest,
    /// Process memory; nothing survives the run
    Memory,
}

/// Event store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "defaults::store_backend")]
    pub backend: StoreBackend,

    #[serde(default = "defaults::store_dir")]
    pub dir: PathBuf,

    /// Base URL of the REST API (e.g. `https://<project>.supabase.co`)
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "defaults::events_table")]
    pub events_table: String,

    #[serde(default = "defaults::logs_table")]
    pub logs_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: defaults::store_backend(),
            dir: defaults::store_dir(),
            url: None,
            api_key: None,
            events_table: defaults::events_table(),
            logs_table: defaults::logs_table(),
        }
    }
}

/// Operator alert channels. Absent URLs disable the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default, skip_serializing)]
    pub slack_webhook_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub webhook_url: Option<String>,

    #[serde(default = "defaults::alert_timeout")]
    pub timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            webhook_url: None,
            timeout_secs: defaults::alert_timeout(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::StoreBackend;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; MachiEventBot/1.0)".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn utc_offset_hours() -> i32 {
        9
    }

    // Retry defaults
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_delay_ms() -> u64 {
        1000
    }
    pub fn max_delay_ms() -> u64 {
        30_000
    }
    pub fn jitter_ratio() -> f64 {
        0.1
    }

    // Drift defaults
    pub fn drift_window() -> usize {
        10
    }
    pub fn drift_min_samples() -> usize {
        3
    }
    pub fn drift_min_ratio() -> f64 {
        0.5
    }
    pub fn drift_max_invalid() -> f64 {
        0.5
    }
    pub fn drift_min_title() -> usize {
        3
    }

    // Parsing defaults
    pub fn max_title_chars() -> usize {
        200
    }
    pub fn max_detail_chars() -> usize {
        2000
    }

    // Cleaning defaults
    pub fn title_remove_patterns() -> Vec<String> {
        vec!["NEW!".into(), "New!".into(), "new!".into(), "【新着】".into()]
    }

    // Store defaults
    pub fn store_backend() -> StoreBackend {
        StoreBackend::Local
    }
    pub fn store_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn events_table() -> String {
        "events".into()
    }
    pub fn logs_table() -> String {
        "scraping_logs".into()
    }

    // Alert defaults
    pub fn alert_timeout() -> u64 {
        10
    }
}
