//! Durable named job queues.
//!
//! This crate provides:
//! - One queue per pipeline stage with typed payloads
//! - Retry with exponential backoff and dead-lettering
//! - Delayed jobs, retention of finished jobs and stalled-job reclaim
//! - A Redis Streams backend and an in-memory backend

pub mod error;
pub mod job;
pub mod memory;
pub mod options;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use job::{
    BuildCaptionsJob, GenerateScriptJob, PlatformSchedule, PostVideoJob, QueueJob, RenderVideoJob,
    SchedulePostsJob, SynthVoiceoverJob,
};
pub use memory::MemoryJobQueue;
pub use options::{Backoff, JobOptions, Retention, WorkerLimits};
pub use queue::{FailOutcome, FailedJob, Job, JobCounts, JobHandle, JobQueue};
pub use redis_queue::{QueueConfig, RedisJobQueue};
