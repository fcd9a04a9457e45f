//! Job executor.
//!
//! One pool per queue. Each pool reserves due jobs up to its free
//! concurrency slots, waits on its rate limiter before starting a job, runs
//! the stage handler and reports the outcome back to the queue.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use shortsops_models::Stage;
use shortsops_queue::{FailOutcome, Job, JobQueue, WorkerLimits};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::handlers::{dispatch, HandlerOutcome};
use crate::logging::JobLogger;
use crate::metrics;

/// Backoff after a failed reserve call.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Job executor that processes jobs from every pipeline queue.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: PipelineContext,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, ctx: PipelineContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            ctx,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Signal every pool to stop reserving and every render poll to abort.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run every pool until shutdown, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            concurrency = self.config.limits.concurrency,
            rate_limit_max = self.config.limits.rate_limit_max,
            "Starting job executor"
        );

        let pools: Vec<_> = Stage::ALL
            .iter()
            .map(|&stage| {
                let pool = QueuePool::new(stage, &self.config, self.ctx.clone(), &self.consumer_name);
                let shutdown = self.shutdown.subscribe();
                tokio::spawn(pool.run(shutdown))
            })
            .collect();

        for pool in pools {
            if let Err(e) = pool.await {
                error!("Queue pool task failed: {}", e);
            }
        }

        info!("Job executor stopped");
        Ok(())
    }
}

/// Token bucket refilling `rate_limit_max` tokens per `rate_window`.
pub(crate) fn rate_quota(limits: &WorkerLimits) -> Quota {
    let max = NonZeroU32::new(limits.rate_limit_max).unwrap_or(NonZeroU32::MIN);
    let period = limits.rate_window / max.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

/// Workers of a single queue.
struct QueuePool {
    stage: Stage,
    ctx: PipelineContext,
    queue: Arc<dyn JobQueue>,
    semaphore: Arc<Semaphore>,
    limiter: Arc<DefaultDirectRateLimiter>,
    concurrency: usize,
    consumer_name: String,
    idle_poll: Duration,
    claim_interval: Duration,
    claim_min_idle: Duration,
    shutdown_timeout: Duration,
}

impl QueuePool {
    fn new(stage: Stage, config: &WorkerConfig, ctx: PipelineContext, consumer_name: &str) -> Self {
        let concurrency = config.limits.concurrency.max(1);
        Self {
            stage,
            queue: ctx.queue.clone(),
            ctx,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            limiter: Arc::new(RateLimiter::direct(rate_quota(&config.limits))),
            concurrency,
            consumer_name: consumer_name.to_string(),
            idle_poll: config.idle_poll,
            claim_interval: config.claim_interval,
            claim_min_idle: config.claim_min_idle,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = self.stage.as_str(), "Queue pool started");
        let mut last_claim = Instant::now();

        loop {
            if *shutdown.borrow() {
                info!(queue = self.stage.as_str(), "Shutdown signal received, stopping pool");
                break;
            }

            if last_claim.elapsed() >= self.claim_interval {
                last_claim = Instant::now();
                self.reclaim(&shutdown).await;
            }

            let wait = match self.consume(&shutdown).await {
                Ok(0) => self.idle_poll,
                Ok(count) => {
                    debug!(queue = self.stage.as_str(), count, "Dispatched jobs");
                    continue;
                }
                Err(e) => {
                    error!(queue = self.stage.as_str(), "Error consuming jobs: {}", e);
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(queue = self.stage.as_str(), "Waiting for in-flight jobs to complete...");
        let drained = tokio::time::timeout(
            self.shutdown_timeout,
            self.semaphore.acquire_many(self.concurrency as u32),
        )
        .await;
        if drained.is_err() {
            warn!(
                queue = self.stage.as_str(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "In-flight jobs still running after shutdown timeout"
            );
        }
    }

    /// Reserve and dispatch up to the free slot count. Returns jobs dispatched.
    async fn consume(&self, cancel: &watch::Receiver<bool>) -> WorkerResult<usize> {
        let available = self.semaphore.available_permits();
        if available == 0 {
            return Ok(0);
        }

        let jobs = self
            .queue
            .reserve(self.stage, &self.consumer_name, available)
            .await?;
        let count = jobs.len();
        for job in jobs {
            self.spawn_job(job, cancel.clone()).await;
        }
        Ok(count)
    }

    /// Take over jobs whose consumer stopped acknowledging them.
    async fn reclaim(&self, cancel: &watch::Receiver<bool>) {
        match self
            .queue
            .reclaim_stalled(self.stage, &self.consumer_name, self.claim_min_idle)
            .await
        {
            Ok(jobs) if !jobs.is_empty() => {
                info!(queue = self.stage.as_str(), count = jobs.len(), "Reclaimed stalled jobs");
                metrics::record_reclaimed(self.stage.as_str(), jobs.len());
                for job in jobs {
                    self.spawn_job(job, cancel.clone()).await;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(queue = self.stage.as_str(), "Failed to reclaim stalled jobs: {}", e),
        }
    }

    async fn spawn_job(&self, job: Job, cancel: watch::Receiver<bool>) {
        self.limiter.until_ready().await;

        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(queue = self.stage.as_str(), "Job semaphore closed");
                return;
            }
        };
        metrics::set_jobs_in_flight(
            self.stage.as_str(),
            self.concurrency - self.semaphore.available_permits(),
        );

        let ctx = self.ctx.clone();
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            let _permit = permit;
            execute_job(&ctx, queue.as_ref(), job, cancel).await;
        });
    }
}

/// Run one delivery and report its outcome to the queue.
pub(crate) async fn execute_job(
    ctx: &PipelineContext,
    queue: &dyn JobQueue,
    job: Job,
    cancel: watch::Receiver<bool>,
) -> Option<FailOutcome> {
    let logger = JobLogger::new(&job);
    let queue_name = logger.queue();
    logger.log_start();
    metrics::record_job_started(queue_name);

    let started = Instant::now();
    let result = dispatch(ctx, &job.payload, cancel)
        .instrument(logger.create_span())
        .await;
    let elapsed = started.elapsed();

    match result {
        Ok(outcome) => {
            let label = match &outcome {
                HandlerOutcome::Completed => {
                    logger.log_completion(elapsed.as_millis());
                    "completed"
                }
                HandlerOutcome::Skipped(reason) => {
                    logger.log_skipped(reason);
                    metrics::record_job_skipped(queue_name);
                    "skipped"
                }
            };
            if let Err(e) = queue.complete(&job).await {
                error!(job_id = %job.id, "Failed to ack job: {}", e);
            }
            metrics::record_job_finished(queue_name, label, elapsed.as_secs_f64());
            None
        }
        Err(err) => {
            let retryable = err.is_retryable();
            let message = err.to_string();
            logger.log_error(&message, retryable);

            match queue.fail(&job, &message, retryable).await {
                Ok(outcome) => {
                    let label = match &outcome {
                        FailOutcome::Retrying { attempt, delay } => {
                            info!(
                                job_id = %job.id,
                                next_attempt = attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Job scheduled for retry"
                            );
                            "retrying"
                        }
                        FailOutcome::DeadLettered => {
                            warn!(job_id = %job.id, queue = queue_name, "Job moved to failed set");
                            "dead_lettered"
                        }
                    };
                    metrics::record_job_finished(queue_name, label, elapsed.as_secs_f64());
                    Some(outcome)
                }
                Err(e) => {
                    error!(job_id = %job.id, "Failed to record job failure: {}", e);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use shortsops_models::MediaItemId;
    use shortsops_queue::{GenerateScriptJob, QueueJob};

    use crate::handlers::testing::Harness;

    fn no_cancel() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[test]
    fn test_rate_quota() {
        let quota = rate_quota(&WorkerLimits::default());
        assert_eq!(quota.burst_size().get(), 10);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(100));

        let zero = WorkerLimits {
            rate_limit_max: 0,
            ..WorkerLimits::default()
        };
        assert_eq!(rate_quota(&zero).burst_size().get(), 1);
    }

    #[tokio::test]
    async fn test_completed_job_is_acked() {
        let h = Harness::new();
        let item = h.media_item().await;
        h.ctx
            .queue
            .enqueue(QueueJob::GenerateScript(GenerateScriptJob::new(
                item.id.clone(),
                "fitness",
                "en",
            )))
            .await
            .unwrap();

        let job = h
            .queue
            .reserve(Stage::GenerateScript, "c1", 1)
            .await
            .unwrap()
            .remove(0);
        let outcome = execute_job(&h.ctx, h.queue.as_ref(), job, no_cancel()).await;
        assert!(outcome.is_none());

        let counts = h.queue.counts(Stage::GenerateScript).await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.active, 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_dead_letters() {
        let h = Harness::new();
        h.ctx
            .queue
            .enqueue(QueueJob::GenerateScript(GenerateScriptJob::new(
                MediaItemId::from("missing"),
                "fitness",
                "en",
            )))
            .await
            .unwrap();

        let job = h
            .queue
            .reserve(Stage::GenerateScript, "c1", 1)
            .await
            .unwrap()
            .remove(0);
        let outcome = execute_job(&h.ctx, h.queue.as_ref(), job, no_cancel()).await;
        assert_eq!(outcome, Some(FailOutcome::DeadLettered));

        let failed = h.queue.failed_jobs(Stage::GenerateScript, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.contains("not found"));
    }

    #[tokio::test]
    async fn test_executor_drains_pipeline_and_stops() {
        let h = Harness::new();
        let item = h.media_item().await;
        h.ctx
            .queue
            .enqueue(QueueJob::GenerateScript(GenerateScriptJob::new(
                item.id.clone(),
                "crypto",
                "en",
            )))
            .await
            .unwrap();

        let mut ctx = h.ctx.clone();
        ctx.settings.render_provider = "invideo".to_string();
        let config = WorkerConfig {
            idle_poll: Duration::from_millis(5),
            shutdown_timeout: Duration::from_secs(2),
            ..WorkerConfig::default()
        };
        let executor = Arc::new(JobExecutor::new(config, ctx));
        let runner = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.run().await })
        };

        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let stored = h.reload(&item).await;
            if stored.status == shortsops_models::MediaStatus::Ready {
                break;
            }
            assert!(Instant::now() < deadline, "pipeline did not finish: {:?}", stored);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        executor.shutdown();
        let joined = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap();
        tokio_test::assert_ok!(joined.unwrap());
    }
}
