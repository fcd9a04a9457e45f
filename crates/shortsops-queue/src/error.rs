//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The durable store cannot accept or hand out work.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Job not found: {queue}/{id}")]
    JobNotFound { queue: String, id: String },

    #[error("Redis error: {0}")]
    Redis(redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn job_not_found(queue: impl Into<String>, id: impl Into<String>) -> Self {
        Self::JobNotFound {
            queue: queue.into(),
            id: id.into(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Redis(e)
        }
    }
}
