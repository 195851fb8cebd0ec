//! Storage abstractions for events and the scraping log.
//!
//! The event store is shared by every source pipeline of a run; each
//! operation is a narrow, self-contained call. Backends:
//!
//! - `memory`: process memory (tests and dry runs)
//! - `local`: JSON files on disk
//! - `rest`: a PostgREST-compatible HTTP API
//!
//! ```text
//! {store.dir}/
//! ├── events.json           # Current event set
//! └── scraping_logs.jsonl   # Append-only run log
//! ```

pub mod local;
pub mod memory;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, CrawlerConfig, DedupKey, LogEntry, StoreBackend, StoreConfig};

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use rest::RestStore;

/// Insert/query/delete access to the event set.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Delete every stored event.
    async fn clear_events(&self) -> Result<()>;

    /// Whether an event with the same dedup key is stored.
    async fn event_exists(&self, key: &DedupKey<'_>) -> Result<bool>;

    async fn insert_event(&self, event: &CandidateEvent) -> Result<()>;
}

/// Append-only run log; also the drift baseline.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append_log(&self, entry: &LogEntry) -> Result<()>;

    /// Event counts of the latest successful, non-empty runs of a site,
    /// newest first.
    async fn recent_success_counts(&self, site: &str, limit: usize) -> Result<Vec<usize>>;
}

/// A backend providing both halves.
pub trait Store: EventStore + LogStore {}

impl<T: EventStore + LogStore> Store for T {}

/// Open the configured backend.
pub fn open_store(config: &StoreConfig, crawler: &CrawlerConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Local => Ok(Arc::new(LocalStore::new(&config.dir))),
        StoreBackend::Rest => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| AppError::config("store.url is required for the rest backend"))?;
            Ok(Arc::new(RestStore::new(url, config, crawler)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rest_without_url_fails() {
        let config = StoreConfig {
            backend: StoreBackend::Rest,
            ..StoreConfig::default()
        };
        assert!(open_store(&config, &CrawlerConfig::default()).is_err());
    }

    #[test]
    fn test_open_memory_and_local() {
        let crawler = CrawlerConfig::default();
        for backend in [StoreBackend::Memory, StoreBackend::Local] {
            let config = StoreConfig {
                backend,
                ..StoreConfig::default()
            };
            assert!(open_store(&config, &crawler).is_ok());
        }
    }
}
