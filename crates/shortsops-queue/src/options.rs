//! Job options and worker limits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default attempts per job.
pub const DEFAULT_ATTEMPTS: u32 = 5;
/// Base delay of the exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
/// Completed jobs are kept this long...
pub const COMPLETED_RETENTION_AGE: Duration = Duration::from_secs(3600);
/// ...and at most this many per queue.
pub const COMPLETED_RETENTION_COUNT: usize = 100;
/// Failed (exhausted) jobs are kept this long.
pub const FAILED_RETENTION_AGE: Duration = Duration::from_secs(86_400);

/// Retry backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`
    Exponential { base_ms: u64 },
    Fixed { delay_ms: u64 },
}

impl Backoff {
    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential { base_ms } => {
                let exp = attempt.saturating_sub(1).min(20);
                Duration::from_millis(base_ms.saturating_mul(1u64 << exp))
            }
            Backoff::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base_ms: DEFAULT_BACKOFF_BASE.as_millis() as u64,
        }
    }
}

/// How long finished jobs stay inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub age_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Retention {
    pub fn age(&self) -> Duration {
        Duration::from_secs(self.age_secs)
    }

    /// Entries finished at or before this epoch-millisecond time are expired
    /// at `now`.
    pub fn cutoff_ms(&self, now: DateTime<Utc>) -> i64 {
        let age_ms = i64::try_from(self.age_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        now.timestamp_millis().saturating_sub(age_ms)
    }
}

/// Per-job options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub attempts: u32,
    pub backoff: Backoff,
    pub remove_on_complete: Retention,
    pub remove_on_fail: Retention,
    /// Initial delay before the job becomes available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: Backoff::default(),
            remove_on_complete: Retention {
                age_secs: COMPLETED_RETENTION_AGE.as_secs(),
                count: Some(COMPLETED_RETENTION_COUNT),
            },
            remove_on_fail: Retention {
                age_secs: FAILED_RETENTION_AGE.as_secs(),
                count: None,
            },
            delay_ms: None,
        }
    }
}

impl JobOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = (!delay.is_zero()).then(|| delay.as_millis() as u64);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(0))
    }
}

/// Per-queue worker limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    /// Jobs processed concurrently per queue
    pub concurrency: usize,
    /// Jobs started per `rate_window`
    pub rate_limit_max: u32,
    pub rate_window: Duration,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit_max: 10,
            rate_window: Duration::from_secs(1),
        }
    }
}

impl WorkerLimits {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
            rate_limit_max: std::env::var("WORKER_RATE_LIMIT_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_max),
            rate_window: std::env::var("WORKER_RATE_LIMIT_WINDOW_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_from_two_seconds() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn test_default_options() {
        let opts = JobOptions::default();
        assert_eq!(opts.attempts, 5);
        assert_eq!(opts.remove_on_complete.age(), Duration::from_secs(3600));
        assert_eq!(opts.remove_on_complete.count, Some(100));
        assert_eq!(opts.remove_on_fail.age(), Duration::from_secs(86_400));
        assert_eq!(opts.delay(), Duration::ZERO);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let failed = JobOptions::default().remove_on_fail;
        assert_eq!(
            failed.cutoff_ms(now),
            now.timestamp_millis() - 86_400_000
        );

        let forever = Retention {
            age_secs: u64::MAX,
            count: None,
        };
        assert_eq!(forever.cutoff_ms(now), now.timestamp_millis() - i64::MAX);
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        let opts = JobOptions::default().with_delay(Duration::ZERO);
        assert_eq!(opts.delay_ms, None);
    }

    #[test]
    fn test_default_limits() {
        let limits = WorkerLimits::default();
        assert_eq!(limits.concurrency, 5);
        assert_eq!(limits.rate_limit_max, 10);
        assert_eq!(limits.rate_window, Duration::from_secs(1));
    }
}
