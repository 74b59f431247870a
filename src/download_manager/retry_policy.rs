//! Retry policy for failed downloads.
//!
//! Implements exponential backoff with configurable parameters.

use super::DownloadError;
use crate::config::DownloadSettings;
use std::time::Duration;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap for the exponential growth, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(settings: &DownloadSettings) -> Self {
        Self {
            initial_backoff_ms: settings.initial_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            backoff_multiplier: settings.backoff_multiplier,
        }
    }

    /// Delay before the attempt following `failed_attempts` failures.
    ///
    /// Uses `initial_backoff * multiplier^(failed_attempts - 1)`, capped at
    /// `max_backoff_ms`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    /// Whether a task that has now failed `failed_attempts` times gets another attempt.
    pub fn should_retry(&self, error: &DownloadError, failed_attempts: u32, max_attempts: u32) -> bool {
        error.is_retryable() && failed_attempts < max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}
