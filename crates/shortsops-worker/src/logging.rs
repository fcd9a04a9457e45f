//! Structured job logging utilities.

use shortsops_queue::Job;
use tracing::{error, info, warn, Span};

/// Logs job lifecycle events with the job id, queue and subject attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    queue: &'static str,
    subject: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            queue: job.queue.as_str(),
            subject: job.payload.subject().to_string(),
            attempt: job.attempt(),
        }
    }

    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject,
            attempt = self.attempt,
            "Job started"
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject,
            "Job progress: {}", message
        );
    }

    pub fn log_skipped(&self, reason: &str) {
        warn!(
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject,
            "Job skipped: {}", reason
        );
    }

    pub fn log_error(&self, message: &str, retryable: bool) {
        error!(
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject,
            attempt = self.attempt,
            retryable,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, elapsed_ms: u128) {
        info!(
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject,
            elapsed_ms = elapsed_ms as u64,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn queue(&self) -> &'static str {
        self.queue
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            queue = self.queue,
            subject = %self.subject
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortsops_models::PostTaskId;
    use shortsops_queue::{JobOptions, PostVideoJob, QueueJob};

    #[test]
    fn test_logger_context() {
        let payload = QueueJob::PostVideo(PostVideoJob {
            post_task_id: PostTaskId::from("req-youtube"),
        });
        let job = Job::new(payload.stage(), "post-video", payload, JobOptions::default());
        let logger = JobLogger::new(&job);

        assert_eq!(logger.job_id(), job.id.to_string());
        assert_eq!(logger.queue(), "post-video");
    }
}
