//! Worker error types.

use shortsops_models::{AssetKind, Platform};
use shortsops_providers::ProviderError;
use shortsops_queue::QueueError;
use shortsops_storage::StorageError;
use shortsops_store::StoreError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Media item {media_item_id} is missing assets: {}", format_kinds(.missing))]
    MissingAssets {
        media_item_id: String,
        missing: Vec<AssetKind>,
    },

    #[error("Video not ready for media item {0}")]
    VideoNotReady(String),

    #[error("No {} connection for account {account}", .platform.as_str())]
    NoConnection { account: String, platform: Platform },

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Render job not found: {0}")]
    JobNotFound(String),

    #[error("Render {job_id} did not finish after {attempts} status checks")]
    RenderTimeout { job_id: String, attempts: u32 },

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Unknown render provider: {0}")]
    UnknownProvider(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cancelled by shutdown")]
    Cancelled,
}

fn format_kinds(kinds: &[AssetKind]) -> String {
    kinds
        .iter()
        .map(AssetKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Whether the queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(_)
            | WorkerError::RenderFailed(_)
            | WorkerError::Queue(_)
            | WorkerError::Cancelled => true,
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the media item or post task should be marked FAILED.
    ///
    /// Cancellation leaves the entity as it is for the next delivery.
    pub fn marks_failed(&self) -> bool {
        !matches!(self, WorkerError::Cancelled)
    }
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store(other),
        }
    }
}

impl From<ProviderError> for WorkerError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::JobNotFound(id) => Self::JobNotFound(id),
            ProviderError::Credentials(msg) => Self::Credentials(msg),
            ProviderError::Disabled(msg) => Self::InvalidRequest(msg),
            ProviderError::Storage(e) => Self::Storage(e),
            other => Self::Provider(other),
        }
    }
}
