//! Queue contract shared by the Redis and in-memory backends.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortsops_models::{JobId, Stage};

use crate::error::QueueResult;
use crate::job::QueueJob;
use crate::options::JobOptions;

/// A job as stored in a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub queue: Stage,
    pub name: String,
    pub payload: QueueJob,
    /// Attempts that have already failed
    #[serde(default)]
    pub attempts_made: u32,
    pub options: JobOptions,
    pub enqueued_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Backend delivery token (stream message id)
    #[serde(skip)]
    pub receipt: Option<String>,
}

impl Job {
    pub fn new(queue: Stage, name: impl Into<String>, payload: QueueJob, options: JobOptions) -> Self {
        let now = Utc::now();
        let available_at = chrono::Duration::from_std(options.delay())
            .map(|d| now + d)
            .unwrap_or(now);
        Self {
            id: JobId::new(),
            queue,
            name: name.into(),
            payload,
            attempts_made: 0,
            options,
            enqueued_at: now,
            available_at,
            last_error: None,
            receipt: None,
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            queue: self.queue,
            name: self.name.clone(),
        }
    }

    /// 1-based number of the attempt in progress.
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.available_at <= now
    }

    /// Decide the outcome of a failed attempt and update the job for it.
    pub fn record_failure(&mut self, error: &str, retryable: bool, now: DateTime<Utc>) -> FailOutcome {
        self.attempts_made += 1;
        self.last_error = Some(error.to_string());

        if retryable && self.attempts_made < self.options.attempts {
            let delay = self.options.backoff.delay_for(self.attempts_made);
            self.available_at = chrono::Duration::from_std(delay)
                .map(|d| now + d)
                .unwrap_or(now);
            FailOutcome::Retrying {
                attempt: self.attempts_made,
                delay,
            }
        } else {
            FailOutcome::DeadLettered
        }
    }

    /// Reset for a fresh run after operator recovery.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.attempts_made = 0;
        self.last_error = None;
        self.available_at = now;
        self.receipt = None;
    }
}

/// Returned by enqueue operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: JobId,
    pub queue: Stage,
    pub name: String,
}

/// What happened to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Scheduled for another attempt after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Out of attempts or not retryable
    DeadLettered,
}

/// A dead-lettered job kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub job: Job,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Per-queue job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Durable named job queues.
///
/// Delivery is at-least-once: a reserved job that is never completed or
/// failed is handed out again by [`JobQueue::reclaim_stalled`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to `queue`.
    async fn add(
        &self,
        queue: Stage,
        name: &str,
        payload: QueueJob,
        options: JobOptions,
    ) -> QueueResult<JobHandle>;

    /// Add a job to the queue of its stage with default options.
    async fn enqueue(&self, payload: QueueJob) -> QueueResult<JobHandle> {
        let stage = payload.stage();
        self.add(stage, stage.as_str(), payload, JobOptions::default())
            .await
    }

    /// Add a job that becomes available at `at`; past instants are immediate.
    async fn enqueue_at(&self, payload: QueueJob, at: DateTime<Utc>) -> QueueResult<JobHandle> {
        let stage = payload.stage();
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let options = JobOptions::default().with_delay(delay);
        self.add(stage, stage.as_str(), payload, options).await
    }

    /// Reserve up to `max` due jobs for `consumer`.
    async fn reserve(&self, queue: Stage, consumer: &str, max: usize) -> QueueResult<Vec<Job>>;

    /// Mark a reserved job as done.
    async fn complete(&self, job: &Job) -> QueueResult<()>;

    /// Record a failed attempt. Non-retryable failures are dead-lettered
    /// regardless of remaining attempts.
    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> QueueResult<FailOutcome>;

    async fn counts(&self, queue: Stage) -> QueueResult<JobCounts>;

    /// Most recent dead-lettered jobs, newest first.
    async fn failed_jobs(&self, queue: Stage, limit: usize) -> QueueResult<Vec<FailedJob>>;

    /// Move a dead-lettered job back to its queue with a fresh attempt budget.
    async fn retry_failed(&self, queue: Stage, job_id: &JobId) -> QueueResult<JobHandle>;

    /// Take over jobs reserved longer than `min_idle` ago by any consumer.
    async fn reclaim_stalled(
        &self,
        _queue: Stage,
        _consumer: &str,
        _min_idle: Duration,
    ) -> QueueResult<Vec<Job>> {
        Ok(Vec::new())
    }
}
