// src/pipeline/retry.rs

//! Classified retry with jittered exponential backoff.
//!
//! The executor only knows about attempts and delays. Whether an error is
//! worth another attempt is decided by the error itself through
//! [`Retryable`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::models::RetrySettings;

/// Errors that can tell whether repeating the operation may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Ceiling applied after jitter
    pub max_delay: Duration,
    /// Upper bound of the random addition, as a fraction of the exponential delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_ratio: settings.jitter_ratio,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Exponential part of the delay after `attempt` (0-based) failed.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Largest jitter that may be added after `attempt` failed.
    pub fn max_jitter(&self, attempt: u32) -> Duration {
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        self.exponential_delay(attempt).mul_f64(ratio)
    }

    /// Delay for `attempt` given a jitter sample in `[0, 1]`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let jitter = self.max_jitter(attempt).mul_f64(sample.clamp(0.0, 1.0));
        (self.exponential_delay(attempt) + jitter).min(self.max_delay)
    }

    /// Delay for `attempt` with a fresh random jitter sample.
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::rng().random_range(0.0..=1.0);
        self.delay_with_sample(attempt, sample)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        log::debug!("Operation succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        log::debug!("Non-retryable error, giving up: {}", error);
                        return Err(error);
                    }
                    if attempt + 1 >= attempts {
                        log::warn!("Giving up after {} attempts: {}", attempts, error);
                        return Err(error);
                    }

                    let delay = self.delay(attempt);
                    log::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {}ms",
                        attempt + 1,
                        attempts,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
