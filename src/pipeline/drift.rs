//! Structural drift detection.
//!
//! Flags a source whose yield no longer looks like its own history: the
//! markup probably changed and the selectors now miss.
//!
//! A source needs `min_samples` successful, non-empty runs on record before
//! drift can be asserted. Below that, every check is a cold start.

use std::fmt;

use crate::error::{AppError, Result};
use crate::models::{CandidateEvent, DriftSettings};
use crate::utils::grapheme_len;

/// Why a batch looks broken.
#[derive(Debug, Clone, PartialEq)]
pub enum DriftReason {
    /// Nothing extracted although the source used to yield events
    NoEvents,
    /// Yield fell below the configured share of the historical mean
    CountDrop { current: usize, avg: f64 },
    /// Too many candidates with a blank title. The date is typed, so a
    /// candidate cannot lack one; the parsers already drop blank titles and
    /// this only fires for candidates built elsewhere.
    InvalidFields { invalid: usize, total: usize },
    /// Too many titles outside the plausible length band
    AbnormalTitles { abnormal: usize, total: usize },
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftReason::NoEvents => {
                f.write_str("No events found - possible structure change or site issue")
            }
            DriftReason::CountDrop { current, avg } => write!(
                f,
                "Event count dropped significantly ({current} vs avg {avg:.1})"
            ),
            DriftReason::InvalidFields { invalid, total } => write!(
                f,
                "Too many invalid events: {invalid}/{total} ({:.1}%)",
                percent(*invalid, *total)
            ),
            DriftReason::AbnormalTitles { abnormal, total } => write!(
                f,
                "Too many events with abnormal titles: {abnormal}/{total} ({:.1}%)",
                percent(*abnormal, *total)
            ),
        }
    }
}

fn percent(part: usize, total: usize) -> f64 {
    part as f64 / total as f64 * 100.0
}

/// Result of a drift check.
#[derive(Debug, Clone, PartialEq)]
pub enum DriftVerdict {
    /// Not enough history to judge
    ColdStart { current_count: usize, samples: usize },
    /// Yield consistent with history
    Stable { current_count: usize, avg_count: f64 },
    /// Yield inconsistent with history
    Drifted {
        reason: DriftReason,
        current_count: usize,
        avg_count: f64,
    },
}

impl DriftVerdict {
    pub fn is_drifted(&self) -> bool {
        matches!(self, DriftVerdict::Drifted { .. })
    }

    pub fn current_count(&self) -> usize {
        match self {
            DriftVerdict::ColdStart { current_count, .. }
            | DriftVerdict::Stable { current_count, .. }
            | DriftVerdict::Drifted { current_count, .. } => *current_count,
        }
    }

    pub fn avg_count(&self) -> Option<f64> {
        match self {
            DriftVerdict::ColdStart { .. } => None,
            DriftVerdict::Stable { avg_count, .. } | DriftVerdict::Drifted { avg_count, .. } => {
                Some(*avg_count)
            }
        }
    }

    pub fn reason(&self) -> Option<&DriftReason> {
        match self {
            DriftVerdict::Drifted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Compares a batch of candidates against the source's recent yields.
#[derive(Debug, Clone, Default)]
pub struct DriftDetector {
    settings: DriftSettings,
}

impl DriftDetector {
    pub fn new(settings: DriftSettings) -> Self {
        Self { settings }
    }

    /// Judge the current batch.
    ///
    /// `history` holds past event counts, newest first. Only the first
    /// `window` entries are considered.
    pub fn check(&self, candidates: &[CandidateEvent], history: &[usize]) -> DriftVerdict {
        let current_count = candidates.len();
        let history = &history[..history.len().min(self.settings.window)];

        if history.len() < self.settings.min_samples {
            return DriftVerdict::ColdStart {
                current_count,
                samples: history.len(),
            };
        }

        let avg_count = history.iter().sum::<usize>() as f64 / history.len() as f64;
        let drifted = |reason| DriftVerdict::Drifted {
            reason,
            current_count,
            avg_count,
        };

        if current_count == 0 {
            return drifted(DriftReason::NoEvents);
        }

        if (current_count as f64) < avg_count * self.settings.min_ratio_of_mean {
            return drifted(DriftReason::CountDrop {
                current: current_count,
                avg: avg_count,
            });
        }

        let limit = self.settings.max_invalid_ratio;
        let share = |n: usize| n as f64 / current_count as f64;

        let invalid = candidates
            .iter()
            .filter(|e| e.title.trim().is_empty())
            .count();
        if share(invalid) > limit {
            return drifted(DriftReason::InvalidFields {
                invalid,
                total: current_count,
            });
        }

        let title_band = self.settings.min_title_chars..=self.settings.max_title_chars;
        let abnormal = candidates
            .iter()
            .filter(|e| !title_band.contains(&grapheme_len(&e.title)))
            .count();
        if share(abnormal) > limit {
            return drifted(DriftReason::AbnormalTitles {
                abnormal,
                total: current_count,
            });
        }

        DriftVerdict::Stable {
            current_count,
            avg_count,
        }
    }
}

impl DriftVerdict {
    /// Log the verdict; drift becomes [`AppError::StructureChanged`].
    pub fn ensure_stable(&self, site: &str) -> Result<()> {
        match self {
            DriftVerdict::ColdStart {
                current_count,
                samples,
            } => {
                log::info!(
                    "[{}] Drift: COLD START ({} events, {} samples on record)",
                    site,
                    current_count,
                    samples
                );
                Ok(())
            }
            DriftVerdict::Stable {
                current_count,
                avg_count,
            } => {
                log::info!(
                    "[{}] Drift: STABLE ({} events, avg {:.1})",
                    site,
                    current_count,
                    avg_count
                );
                Ok(())
            }
            DriftVerdict::Drifted { reason, .. } => {
                log::error!("[{}] Drift: DETECTED - {}", site, reason);
                Err(AppError::StructureChanged {
                    reason: reason.to_string(),
                })
            }
        }
    }
}
