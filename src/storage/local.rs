//! Local filesystem store.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── events.json           # Array of event rows
//! └── scraping_logs.jsonl   # One LogEntry per line, oldest first
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, DedupKey, LogEntry};
use crate::storage::{EventStore, LogStore};

const EVENTS_KEY: &str = "events.json";
const LOGS_KEY: &str = "scraping_logs.jsonl";

/// Stored event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// Fingerprint of the dedup key
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: CandidateEvent,
}

/// Local filesystem storage backend.
#[derive(Debug)]
pub struct LocalStore {
    root_dir: PathBuf,
    // Serializes read-modify-write of the event file
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_rows(&self) -> Result<Vec<EventRow>> {
        Ok(self.read_json(EVENTS_KEY).await?.unwrap_or_default())
    }

    /// All stored events.
    pub async fn load_events(&self) -> Result<Vec<CandidateEvent>> {
        Ok(self.load_rows().await?.into_iter().map(|r| r.event).collect())
    }

    async fn load_logs(&self) -> Result<Vec<LogEntry>> {
        let Some(bytes) = self.read_bytes(LOGS_KEY).await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&bytes);
        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("Skipping malformed log line {}: {}", n + 1, e),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl EventStore for LocalStore {
    async fn clear_events(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(EVENTS_KEY, &Vec::<EventRow>::new()).await
    }

    async fn event_exists(&self, key: &DedupKey<'_>) -> Result<bool> {
        let id = key.fingerprint();
        Ok(self.load_rows().await?.iter().any(|r| r.id == id))
    }

    async fn insert_event(&self, event: &CandidateEvent) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.load_rows().await?;
        let id = event.dedup_key().fingerprint();
        if rows.iter().any(|r| r.id == id) {
            return Err(AppError::store(format!(
                "duplicate key {}",
                event.dedup_key()
            )));
        }
        rows.push(EventRow {
            id,
            created_at: Utc::now(),
            event: event.clone(),
        });
        self.write_json(EVENTS_KEY, &rows).await
    }
}

#[async_trait]
impl LogStore for LocalStore {
    async fn append_log(&self, entry: &LogEntry) -> Result<()> {
        let path = self.path(LOGS_KEY);
        self.ensure_dir(&path).await?;

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent_success_counts(&self, site: &str, limit: usize) -> Result<Vec<usize>> {
        let mut matching: Vec<LogEntry> = self
            .load_logs()
            .await?
            .into_iter()
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
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn event(title: &str) -> CandidateEvent {
        CandidateEvent::new(
            title,
            NaiveDate::from_ymd_opt(2025, 11, 7).unwrap(),
            "https://example.com/1",
            "阿智村役場",
            "阿智村",
        )
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        store.write_bytes("test.txt", b"hello").await.unwrap();
        let data = store.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(store.read_bytes("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_exists_clear() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path().join("nested"));
        let e = event("星まつり");

        assert!(!store.event_exists(&e.dedup_key()).await.unwrap());
        store.insert_event(&e).await.unwrap();
        assert!(store.event_exists(&e.dedup_key()).await.unwrap());
        assert!(store.insert_event(&e).await.is_err());
        assert_eq!(store.load_events().await.unwrap(), vec![e.clone()]);

        // Row keeps the store column names
        let raw: serde_json::Value = store.read_json(EVENTS_KEY).await.unwrap().unwrap();
        assert_eq!(raw[0]["event_date"], "2025-11-07");
        assert_eq!(raw[0]["source_site"], "阿智村役場");

        store.clear_events().await.unwrap();
        assert!(store.load_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_history() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::new(tmp.path());

        for count in [4, 0, 6] {
            store
                .append_log(&LogEntry::new("阿智村役場", RunStatus::Success, count))
                .await
                .unwrap();
        }
        store
            .append_log(&LogEntry::new("阿智村役場", RunStatus::Failure, 0))
            .await
            .unwrap();

        let counts = store.recent_success_counts("阿智村役場", 10).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert!(counts.contains(&4) && counts.contains(&6));
    }
}
