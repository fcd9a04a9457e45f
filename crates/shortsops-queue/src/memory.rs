//! In-process queue backend for tests and single-process runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shortsops_models::{JobId, Stage};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::options::JobOptions;
use crate::queue::{FailOutcome, FailedJob, Job, JobCounts, JobHandle, JobQueue};

#[derive(Default)]
struct QueueState {
    /// Due and not-yet-due jobs, in insertion order
    pending: VecDeque<Job>,
    active: HashMap<JobId, (Job, Instant)>,
    completed: VecDeque<(Job, DateTime<Utc>)>,
    failed: VecDeque<FailedJob>,
}

impl QueueState {
    fn prune(&mut self, now: DateTime<Utc>) {
        self.completed.retain(|(job, at)| {
            let keep_for = chrono::Duration::from_std(job.options.remove_on_complete.age())
                .unwrap_or(chrono::Duration::zero());
            *at + keep_for > now
        });
        if let Some(max) = self
            .completed
            .front()
            .and_then(|(job, _)| job.options.remove_on_complete.count)
        {
            while self.completed.len() > max {
                self.completed.pop_front();
            }
        }
        self.failed.retain(|failed| {
            let keep_for = chrono::Duration::from_std(failed.job.options.remove_on_fail.age())
                .unwrap_or(chrono::Duration::zero());
            failed.failed_at + keep_for > now
        });
    }
}

/// Queue backend holding all state in memory.
#[derive(Default)]
pub struct MemoryJobQueue {
    queues: Mutex<HashMap<Stage, QueueState>>,
    closed: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting work; later `add` calls fail with `Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::unavailable("queue store is closed"));
        }
        Ok(())
    }

    /// Payloads of every job waiting on `queue`, due or not.
    pub async fn pending_payloads(&self, queue: Stage) -> Vec<QueueJob> {
        let queues = self.queues.lock().await;
        queues
            .get(&queue)
            .map(|state| state.pending.iter().map(|job| job.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Jobs waiting on `queue`, due or not.
    pub async fn pending_jobs(&self, queue: Stage) -> Vec<Job> {
        let queues = self.queues.lock().await;
        queues
            .get(&queue)
            .map(|state| state.pending.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn add(
        &self,
        queue: Stage,
        name: &str,
        payload: QueueJob,
        options: JobOptions,
    ) -> QueueResult<JobHandle> {
        self.ensure_open()?;
        let job = Job::new(queue, name, payload, options);
        let handle = job.handle();

        let mut queues = self.queues.lock().await;
        queues.entry(queue).or_default().pending.push_back(job);

        debug!(queue = %queue, job_id = %handle.id, "Job added to queue");
        Ok(handle)
    }

    async fn reserve(&self, queue: Stage, consumer: &str, max: usize) -> QueueResult<Vec<Job>> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();

        let mut reserved = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.pending.len());
        while let Some(mut job) = state.pending.pop_front() {
            if reserved.len() < max && job.is_due(now) {
                job.receipt = Some(format!("{}:{}", consumer, job.id));
                state.active.insert(job.id.clone(), (job.clone(), Instant::now()));
                reserved.push(job);
            } else {
                remaining.push_back(job);
            }
        }
        state.pending = remaining;

        Ok(reserved)
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();

        if state.active.remove(&job.id).is_none() {
            warn!(queue = %job.queue, job_id = %job.id, "Completing job that was not active");
        }
        state.completed.push_back((job.clone(), now));
        state.prune(now);
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> QueueResult<FailOutcome> {
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(job.queue).or_default();
        state.active.remove(&job.id);

        let mut next = job.clone();
        next.receipt = None;
        let outcome = next.record_failure(error, retryable, now);
        match outcome {
            FailOutcome::Retrying { .. } => state.pending.push_back(next),
            FailOutcome::DeadLettered => {
                warn!(queue = %job.queue, job_id = %job.id, error, "Job dead-lettered");
                state.failed.push_back(FailedJob {
                    job: next,
                    error: error.to_string(),
                    failed_at: now,
                });
            }
        }
        state.prune(now);
        Ok(outcome)
    }

    async fn counts(&self, queue: Stage) -> QueueResult<JobCounts> {
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();
        state.prune(now);

        let delayed = state.pending.iter().filter(|job| !job.is_due(now)).count() as u64;
        Ok(JobCounts {
            waiting: state.pending.len() as u64 - delayed,
            delayed,
            active: state.active.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
        })
    }

    async fn failed_jobs(&self, queue: Stage, limit: usize) -> QueueResult<Vec<FailedJob>> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(&queue)
            .map(|state| state.failed.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn retry_failed(&self, queue: Stage, job_id: &JobId) -> QueueResult<JobHandle> {
        self.ensure_open()?;
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();

        let position = state
            .failed
            .iter()
            .position(|failed| &failed.job.id == job_id)
            .ok_or_else(|| QueueError::job_not_found(queue.as_str(), job_id.as_str()))?;

        let mut job = state
            .failed
            .remove(position)
            .map(|failed| failed.job)
            .ok_or_else(|| QueueError::job_not_found(queue.as_str(), job_id.as_str()))?;
        job.reset_for_retry(Utc::now());
        let handle = job.handle();
        state.pending.push_back(job);

        info!(queue = %queue, job_id = %job_id, "Failed job re-enqueued");
        Ok(handle)
    }

    async fn reclaim_stalled(
        &self,
        queue: Stage,
        consumer: &str,
        min_idle: Duration,
    ) -> QueueResult<Vec<Job>> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();

        let mut reclaimed = Vec::new();
        for (job, reserved_at) in state.active.values_mut() {
            if reserved_at.elapsed() >= min_idle {
                *reserved_at = Instant::now();
                job.receipt = Some(format!("{}:{}", consumer, job.id));
                reclaimed.push(job.clone());
            }
        }

        if !reclaimed.is_empty() {
            info!(queue = %queue, count = reclaimed.len(), "Reclaimed stalled jobs");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{PostVideoJob, RenderVideoJob};
    use shortsops_models::{MediaItemId, PostTaskId};

    fn post(id: &str) -> QueueJob {
        QueueJob::PostVideo(PostVideoJob {
            post_task_id: PostTaskId::from(id),
        })
    }

    #[tokio::test]
    async fn test_enqueue_reserve_complete() {
        let queue = MemoryJobQueue::new();
        let handle = queue.enqueue(post("a")).await.unwrap();
        assert_eq!(handle.queue, Stage::PostVideo);
        assert_eq!(handle.name, "post-video");

        let jobs = queue.reserve(Stage::PostVideo, "w1", 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(queue.counts(Stage::PostVideo).await.unwrap().active, 1);

        queue.complete(&jobs[0]).await.unwrap();
        let counts = queue.counts(Stage::PostVideo).await.unwrap();
        assert_eq!(counts.active, 0);
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn test_closed_queue_is_unavailable() {
        let queue = MemoryJobQueue::new();
        queue.close();
        let err = queue.enqueue(post("a")).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_retryable_failure_is_delayed() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(post("a")).await.unwrap();
        let job = queue.reserve(Stage::PostVideo, "w1", 1).await.unwrap().remove(0);

        let outcome = queue.fail(&job, "timeout", true).await.unwrap();
        assert_eq!(
            outcome,
            FailOutcome::Retrying {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert!(queue.reserve(Stage::PostVideo, "w1", 1).await.unwrap().is_empty());
        assert_eq!(queue.counts(Stage::PostVideo).await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn test_dead_letter_and_operator_retry() {
        let queue = MemoryJobQueue::new();
        let job = QueueJob::RenderVideo(RenderVideoJob::new(MediaItemId::from("m1"), "ffmpeg"));
        queue.enqueue(job).await.unwrap();
        let reserved = queue.reserve(Stage::RenderVideo, "w1", 1).await.unwrap().remove(0);

        let outcome = queue.fail(&reserved, "missing assets", false).await.unwrap();
        assert_eq!(outcome, FailOutcome::DeadLettered);

        let failed = queue.failed_jobs(Stage::RenderVideo, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error, "missing assets");

        queue.retry_failed(Stage::RenderVideo, &reserved.id).await.unwrap();
        let again = queue.reserve(Stage::RenderVideo, "w1", 1).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts_made, 0);
        assert_eq!(queue.counts(Stage::RenderVideo).await.unwrap().failed, 0);
    }

    #[tokio::test]
    async fn test_failed_entries_expire_by_own_age() {
        let queue = MemoryJobQueue::new();
        let short_lived = JobOptions {
            remove_on_fail: crate::options::Retention {
                age_secs: 0,
                count: None,
            },
            ..JobOptions::default()
        };
        for options in [short_lived, JobOptions::default()] {
            queue
                .add(Stage::PostVideo, "post-video", post("req-youtube"), options)
                .await
                .unwrap();
            let job = queue.reserve(Stage::PostVideo, "w1", 1).await.unwrap().remove(0);
            queue.fail(&job, "rejected", false).await.unwrap();
        }

        let counts = queue.counts(Stage::PostVideo).await.unwrap();
        assert_eq!(counts.failed, 1);
        let failed = queue.failed_jobs(Stage::PostVideo, 10).await.unwrap();
        assert_eq!(failed[0].job.options.remove_on_fail.age_secs, 86_400);
    }

    #[tokio::test]
    async fn test_retry_unknown_failed_job() {
        let queue = MemoryJobQueue::new();
        let err = tokio_test::assert_err!(
            queue
                .retry_failed(Stage::PostVideo, &JobId::from("nope"))
                .await
        );
        assert!(matches!(err, QueueError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_reclaim_stalled_redelivers() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(post("a")).await.unwrap();
        let first = queue.reserve(Stage::PostVideo, "dead", 1).await.unwrap();
        assert_eq!(first.len(), 1);

        let reclaimed = queue
            .reclaim_stalled(Stage::PostVideo, "alive", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_delayed_job_not_reserved_early() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue_at(post("later"), Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        queue
            .enqueue_at(post("now"), Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();

        let jobs = queue.reserve(Stage::PostVideo, "w1", 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].payload, post("now"));
    }
}
