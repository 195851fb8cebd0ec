// src/models/event.rs

//! Candidate event records produced by the parsers.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Start time, or start and end time, of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    At(NaiveTime),
    Between(NaiveTime, NaiveTime),
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::At(t) => write!(f, "{}", t.format("%H:%M")),
            EventTime::Between(start, end) => {
                write!(f, "{}-{}", start.format("%H:%M"), end.format("%H:%M"))
            }
        }
    }
}

impl FromStr for EventTime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |t: &str| {
            NaiveTime::parse_from_str(t.trim(), "%H:%M")
                .map_err(|e| AppError::validation(format!("invalid event time '{s}': {e}")))
        };
        match s.split_once('-') {
            Some((start, end)) => Ok(EventTime::Between(parse(start)?, parse(end)?)),
            None => Ok(EventTime::At(parse(s)?)),
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An event extracted from a source during one run.
///
/// Field names follow the event store's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,

    /// Always a real calendar date
    pub event_date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<EventTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    pub source_url: String,

    pub source_site: String,

    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    pub is_new: bool,
}

impl CandidateEvent {
    /// Create a candidate with the required fields. `is_new` starts out true.
    pub fn new(
        title: impl Into<String>,
        event_date: NaiveDate,
        source_url: impl Into<String>,
        source_site: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            event_date,
            event_time: None,
            place: None,
            detail: None,
            source_url: source_url.into(),
            source_site: source_site.into(),
            region: region.into(),
            image_url: None,
            is_new: true,
        }
    }

    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            title: &self.title,
            event_date: self.event_date,
            source_site: &self.source_site,
        }
    }
}

/// The `(title, event_date, source_site)` triple that identifies an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub title: &'a str,
    pub event_date: NaiveDate,
    pub source_site: &'a str,
}

impl DedupKey<'_> {
    /// Stable hex digest of the key, used as a row id by file-backed stores.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_site.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.event_date.format("%Y-%m-%d").to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.title.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for DedupKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({})",
            self.source_site, self.title, self.event_date
        )
    }
}
