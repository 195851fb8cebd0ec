//! PostgREST-compatible store (e.g. a Supabase project's REST endpoint).
//!
//! Every transport failure is reported as a store error so the pipeline
//! classifies it as a database problem, not a source problem.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, CrawlerConfig, DedupKey, LogEntry, StoreConfig};
use crate::storage::{EventStore, LogStore};

/// Store talking to `{url}/rest/v1/{table}`.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    events_table: String,
    logs_table: String,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    events_count: usize,
}

impl RestStore {
    pub fn new(url: &str, config: &StoreConfig, crawler: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&crawler.user_agent)
            .timeout(Duration::from_secs(crawler.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            events_table: config.events_table.clone(),
            logs_table: config.logs_table.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| AppError::store(format!("{context}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::store(format!(
                "{context}: status {} {}",
                status.as_u16(),
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn insert_row<T: serde::Serialize + Sync>(&self, table: &str, row: &T) -> Result<()> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(request, &format!("insert into {table}")).await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for RestStore {
    async fn clear_events(&self) -> Result<()> {
        // PostgREST refuses an unfiltered DELETE
        let request = self
            .client
            .delete(self.table_url(&self.events_table))
            .query(&[("source_site", "not.is.null")]);
        self.send(request, "clear events").await?;
        Ok(())
    }

    async fn event_exists(&self, key: &DedupKey<'_>) -> Result<bool> {
        let request = self.client.get(self.table_url(&self.events_table)).query(&[
            ("select", "title".to_string()),
            ("title", format!("eq.{}", key.title)),
            ("event_date", format!("eq.{}", key.event_date.format("%Y-%m-%d"))),
            ("source_site", format!("eq.{}", key.source_site)),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<serde_json::Value> = self
            .send(request, "duplicate check")
            .await?
            .json()
            .await
            .map_err(|e| AppError::store(format!("duplicate check: {e}")))?;
        Ok(!rows.is_empty())
    }

    async fn insert_event(&self, event: &CandidateEvent) -> Result<()> {
        self.insert_row(&self.events_table, event).await
    }
}

#[async_trait]
impl LogStore for RestStore {
    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.insert_row(&self.logs_table, entry).await
    }

    async fn recent_success_counts(&self, site: &str, limit: usize) -> Result<Vec<usize>> {
        let request = self.client.get(self.table_url(&self.logs_table)).query(&[
            ("select", "events_count".to_string()),
            ("site_name", format!("eq.{site}")),
            ("status", "eq.success".to_string()),
            ("events_count", "gt.0".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        let rows: Vec<CountRow> = self
            .send(request, "log history")
            .await?
            .json()
            .await
            .map_err(|e| AppError::store(format!("log history: {e}")))?;
        Ok(rows.into_iter().map(|r| r.events_count).collect())
    }
}
