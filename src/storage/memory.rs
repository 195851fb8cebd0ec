//! In-memory store.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, DedupKey, LogEntry};
use crate::storage::{EventStore, LogStore};

/// Store backed by process memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<Vec<CandidateEvent>>,
    logs: Mutex<Vec<LogEntry>>,
    rejected_titles: HashSet<String>,
    reject_clear: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts of events with this title fail.
    pub fn reject_title(mut self, title: impl Into<String>) -> Self {
        self.rejected_titles.insert(title.into());
        self
    }

    /// Make `clear_events` fail.
    pub fn reject_clear(mut self) -> Self {
        self.reject_clear = true;
        self
    }

    /// Seed the log, e.g. with drift history.
    pub fn with_logs(self, logs: Vec<LogEntry>) -> Self {
        Self {
            logs: Mutex::new(logs),
            ..self
        }
    }

    pub async fn events(&self) -> Vec<CandidateEvent> {
        self.events.lock().await.clone()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().await.clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn clear_events(&self) -> Result<()> {
        if self.reject_clear {
            return Err(AppError::store("delete rejected"));
        }
        self.events.lock().await.clear();
        Ok(())
    }

    async fn event_exists(&self, key: &DedupKey<'_>) -> Result<bool> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .any(|e| e.dedup_key() == *key))
    }

    async fn insert_event(&self, event: &CandidateEvent) -> Result<()> {
        if self.rejected_titles.contains(&event.title) {
            return Err(AppError::store(format!("insert rejected: {}", event.title)));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl LogStore for MemoryStore {
    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.logs.lock().await.push(entry.clone());
        Ok(())
    }

    async fn recent_success_counts(&self, site: &str, limit: usize) -> Result<Vec<usize>> {
        let logs = self.logs.lock().await;
        let mut matching: Vec<&LogEntry> = logs
            .iter()
            .filter(|l| l.site_name == site && l.is_baseline_sample())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .take(limit)
            .map(|l| l.events_count)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;
    use chrono::{Duration, NaiveDate, Utc};

    #[tokio::test]
    async fn test_exists_after_insert() {
        let store = MemoryStore::new();
        let event = CandidateEvent::new(
            "朝市",
            NaiveDate::from_ymd_opt(2025, 10, 5).unwrap(),
            "https://example.com",
            "売木村役場",
            "売木村",
        );
        assert!(!store.event_exists(&event.dedup_key()).await.unwrap());
        store.insert_event(&event).await.unwrap();
        assert!(store.event_exists(&event.dedup_key()).await.unwrap());

        store.clear_events().await.unwrap();
        assert!(store.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_recent_success_counts_newest_first() {
        let now = Utc::now();
        let entry = |count, status, age: i64| LogEntry {
            created_at: now - Duration::minutes(age),
            ..LogEntry::new("a", status, count)
        };
        let store = MemoryStore::new().with_logs(vec![
            entry(5, RunStatus::Success, 30),
            entry(7, RunStatus::Success, 10),
            entry(0, RunStatus::Success, 5),
            entry(9, RunStatus::Failure, 1),
            entry(3, RunStatus::Success, 20),
        ]);
        let counts = store.recent_success_counts("a", 2).await.unwrap();
        assert_eq!(counts, vec![7, 3]);
        assert!(store.recent_success_counts("b", 10).await.unwrap().is_empty());
    }
}
