//! Job queue using Redis Streams.
//!
//! Per queue `q` (all keys under the configured prefix):
//! - `{prefix}:{q}:stream`    due jobs, consumed through a consumer group
//! - `{prefix}:{q}:delayed`   sorted set of not-yet-due jobs scored by due time (ms)
//! - `{prefix}:{q}:completed` sorted set of completed jobs scored by completion time (ms)
//! - `{prefix}:{q}:failed`    sorted set of dead-lettered jobs scored by failure time (ms)
//!
//! Finished entries age out one by one: every write drops the entries older
//! than the retention age and the oldest beyond the retention count.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use shortsops_models::{JobId, Stage};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::options::{JobOptions, Retention};
use crate::queue::{FailOutcome, FailedJob, Job, JobCounts, JobHandle, JobQueue};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for every queue
    pub prefix: String,
    /// How long a reserve call blocks waiting for new jobs
    pub block: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "shortsops".to_string(),
            block: Duration::from_millis(1000),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("QUEUE_PREFIX").unwrap_or_else(|_| "shortsops".to_string()),
            block: Duration::from_millis(
                std::env::var("QUEUE_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

struct Keys {
    stream: String,
    group: String,
    delayed: String,
    completed: String,
    failed: String,
}

/// Redis-backed [`JobQueue`].
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn keys(&self, queue: Stage) -> Keys {
        let base = format!("{}:{}", self.config.prefix, queue.as_str());
        Keys {
            stream: format!("{}:stream", base),
            group: format!("{}:workers", base),
            delayed: format!("{}:delayed", base),
            completed: format!("{}:completed", base),
            failed: format!("{}:failed", base),
        }
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create the consumer group of every queue if it does not exist.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for stage in Stage::ALL {
            let keys = self.keys(stage);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&keys.stream)
                .arg(&keys.group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group: {}", keys.group),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists: {}", keys.group);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn push_stream(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> QueueResult<String> {
        let keys = self.keys(job.queue);
        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&keys.stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(conn)
            .await?;
        Ok(message_id)
    }

    async fn push_delayed(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> QueueResult<()> {
        let keys = self.keys(job.queue);
        let payload = serde_json::to_string(job)?;
        conn.zadd::<_, _, _, ()>(&keys.delayed, payload, job.available_at.timestamp_millis())
            .await?;
        Ok(())
    }

    /// Move due delayed jobs onto the stream.
    async fn promote_due(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: Stage,
    ) -> QueueResult<usize> {
        let keys = self.keys(queue);
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(&keys.delayed, "-inf", now_ms, 0, 100)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // ZREM wins the race between concurrent promoters
            let removed: u32 = conn.zrem(&keys.delayed, &payload).await?;
            if removed == 0 {
                continue;
            }
            redis::cmd("XADD")
                .arg(&keys.stream)
                .arg("*")
                .arg("job")
                .arg(&payload)
                .query_async::<String>(conn)
                .await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(queue = %queue, promoted, "Promoted delayed jobs");
        }
        Ok(promoted)
    }

    /// Acknowledge and delete a delivered message.
    async fn ack(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: Stage,
        message_id: &str,
    ) -> QueueResult<()> {
        let keys = self.keys(queue);
        redis::cmd("XACK")
            .arg(&keys.stream)
            .arg(&keys.group)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&keys.stream)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    async fn parse_entries(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        queue: Stage,
        entries: Vec<redis::streams::StreamId>,
    ) -> Vec<Job> {
        let mut jobs = Vec::new();
        for entry in entries {
            let message_id = entry.id.clone();
            let Some(redis::Value::BulkString(payload)) = entry.map.get("job") else {
                continue;
            };
            match serde_json::from_slice::<Job>(payload) {
                Ok(mut job) => {
                    job.receipt = Some(message_id);
                    jobs.push(job);
                }
                Err(e) => {
                    warn!("Failed to parse job payload: {}", e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack(conn, queue, &message_id).await.ok();
                }
            }
        }
        jobs
    }

    /// Add `payload` to the finished set `key` and prune it to `retention`.
    async fn retain(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        key: &str,
        payload: String,
        finished_at: chrono::DateTime<Utc>,
        retention: Retention,
    ) -> QueueResult<()> {
        conn.zadd::<_, _, _, ()>(key, payload, finished_at.timestamp_millis())
            .await?;
        conn.zrembyscore::<_, _, _, ()>(key, "-inf", retention.cutoff_ms(finished_at))
            .await?;
        if let Some(count) = retention.count {
            // ranks run oldest first; keep the newest `count`
            conn.zremrangebyrank::<_, ()>(key, 0, -(count as isize) - 1)
                .await?;
        }
        // an untouched set is entirely past its age
        conn.expire::<_, ()>(key, retention.age_secs as i64).await?;
        Ok(())
    }

    fn receipt<'a>(job: &'a Job) -> QueueResult<&'a str> {
        job.receipt
            .as_deref()
            .ok_or_else(|| QueueError::job_not_found(job.queue.as_str(), job.id.as_str()))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn add(
        &self,
        queue: Stage,
        name: &str,
        payload: QueueJob,
        options: JobOptions,
    ) -> QueueResult<JobHandle> {
        let mut conn = self.conn().await?;
        let job = Job::new(queue, name, payload, options);

        if job.is_due(Utc::now()) {
            let message_id = self.push_stream(&mut conn, &job).await?;
            info!(queue = %queue, job_id = %job.id, message_id = %message_id, "Job added to queue");
        } else {
            self.push_delayed(&mut conn, &job).await?;
            info!(queue = %queue, job_id = %job.id, available_at = %job.available_at, "Delayed job added to queue");
        }
        Ok(job.handle())
    }

    async fn reserve(&self, queue: Stage, consumer: &str, max: usize) -> QueueResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        self.promote_due(&mut conn, queue).await?;

        let keys = self.keys(queue);
        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&keys.group)
            .arg(consumer)
            .arg("COUNT")
            .arg(max)
            .arg("BLOCK")
            .arg(self.config.block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&keys.stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        Ok(self.parse_entries(&mut conn, queue, entries).await)
    }

    async fn complete(&self, job: &Job) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let message_id = Self::receipt(job)?;
        self.ack(&mut conn, job.queue, message_id).await?;

        let keys = self.keys(job.queue);
        let payload = serde_json::to_string(job)?;
        self.retain(
            &mut conn,
            &keys.completed,
            payload,
            Utc::now(),
            job.options.remove_on_complete,
        )
        .await?;

        debug!(queue = %job.queue, job_id = %job.id, "Acknowledged job");
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> QueueResult<FailOutcome> {
        let mut conn = self.conn().await?;
        let message_id = Self::receipt(job)?;
        let now = Utc::now();

        let mut next = job.clone();
        next.receipt = None;
        let outcome = next.record_failure(error, retryable, now);

        match outcome {
            FailOutcome::Retrying { .. } => self.push_delayed(&mut conn, &next).await?,
            FailOutcome::DeadLettered => {
                let keys = self.keys(job.queue);
                let failed = FailedJob {
                    job: next,
                    error: error.to_string(),
                    failed_at: now,
                };
                self.retain(
                    &mut conn,
                    &keys.failed,
                    serde_json::to_string(&failed)?,
                    now,
                    job.options.remove_on_fail,
                )
                .await?;
                warn!(queue = %job.queue, job_id = %job.id, error, "Moved job to failed set");
            }
        }

        self.ack(&mut conn, job.queue, message_id).await?;
        Ok(outcome)
    }

    async fn counts(&self, queue: Stage) -> QueueResult<JobCounts> {
        let mut conn = self.conn().await?;
        let keys = self.keys(queue);

        let length: u64 = conn.xlen(&keys.stream).await?;
        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&keys.stream)
            .arg(&keys.group)
            .query_async(&mut conn)
            .await?;
        let active = pending.count() as u64;
        let delayed: u64 = conn.zcard(&keys.delayed).await?;
        let completed: u64 = conn.zcard(&keys.completed).await?;
        let failed: u64 = conn.zcard(&keys.failed).await?;

        Ok(JobCounts {
            waiting: length.saturating_sub(active),
            delayed,
            active,
            completed,
            failed,
        })
    }

    async fn failed_jobs(&self, queue: Stage, limit: usize) -> QueueResult<Vec<FailedJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let keys = self.keys(queue);
        // newest first
        let raw: Vec<String> = conn.zrevrange(&keys.failed, 0, limit as isize - 1).await?;

        Ok(raw
            .iter()
            .filter_map(|s| match serde_json::from_str::<FailedJob>(s) {
                Ok(failed) => Some(failed),
                Err(e) => {
                    warn!("Skipping unreadable failed job: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn retry_failed(&self, queue: Stage, job_id: &JobId) -> QueueResult<JobHandle> {
        let mut conn = self.conn().await?;
        let keys = self.keys(queue);
        let raw: Vec<String> = conn.zrevrange(&keys.failed, 0, -1).await?;

        for entry in raw {
            let Ok(failed) = serde_json::from_str::<FailedJob>(&entry) else {
                continue;
            };
            if &failed.job.id != job_id {
                continue;
            }

            let removed: u32 = conn.zrem(&keys.failed, &entry).await?;
            if removed == 0 {
                // another operator got there first
                break;
            }
            let mut job = failed.job;
            job.reset_for_retry(Utc::now());
            self.push_stream(&mut conn, &job).await?;
            info!(queue = %queue, job_id = %job_id, "Failed job re-enqueued");
            return Ok(job.handle());
        }

        Err(QueueError::job_not_found(queue.as_str(), job_id.as_str()))
    }

    async fn reclaim_stalled(
        &self,
        queue: Stage,
        consumer: &str,
        min_idle: Duration,
    ) -> QueueResult<Vec<Job>> {
        let mut conn = self.conn().await?;
        let keys = self.keys(queue);
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&keys.stream)
            .arg(&keys.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(50)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(&keys.stream)
            .arg(&keys.group)
            .arg(consumer)
            .arg(min_idle_ms);
        for id in &pending.ids {
            cmd.arg(&id.id);
        }
        let claimed: redis::streams::StreamClaimReply = cmd.query_async(&mut conn).await?;

        let jobs = self.parse_entries(&mut conn, queue, claimed.ids).await;
        if !jobs.is_empty() {
            info!(queue = %queue, count = jobs.len(), "Claimed stalled jobs");
        }
        Ok(jobs)
    }
}
