//! Deduplicating insert of candidate events.

use crate::error::{AppError, Result};
use crate::models::CandidateEvent;
use crate::storage::EventStore;

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// An event with the same (title, date, site) is already stored
    Duplicate,
}

/// Tallies for one source's batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Check the dedup key, then insert. Store errors propagate so callers can
/// tell a failed write from a duplicate.
pub async fn ingest_one<S>(store: &S, event: &CandidateEvent) -> Result<IngestOutcome>
where
    S: EventStore + ?Sized,
{
    if store.event_exists(&event.dedup_key()).await? {
        return Ok(IngestOutcome::Duplicate);
    }
    store.insert_event(event).await?;
    Ok(IngestOutcome::Inserted)
}

/// Ingest candidates one by one. A failed candidate does not stop the rest.
///
/// Returns the tallies and the last store error, if any.
pub async fn ingest_all<S>(
    store: &S,
    site: &str,
    events: &[CandidateEvent],
) -> (IngestStats, Option<AppError>)
where
    S: EventStore + ?Sized,
{
    let mut stats = IngestStats::default();
    let mut last_error = None;

    for event in events {
        match ingest_one(store, event).await {
            Ok(IngestOutcome::Inserted) => stats.inserted += 1,
            Ok(IngestOutcome::Duplicate) => {
                log::debug!("[{}] Skipping duplicate: {}", site, event.dedup_key());
                stats.duplicates += 1;
            }
            Err(e) => {
                log::warn!("[{}] Failed to insert '{}': {}", site, event.title, e);
                stats.failures += 1;
                last_error = Some(e);
            }
        }
    }
    (stats, last_error)
}
