//! Object storage contract.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{StorageError, StorageResult};

/// Lifetime of signed URLs for rendered output.
pub const RENDER_URL_TTL: Duration = Duration::from_secs(86_400);

/// Blob store used for audio, captions and rendered video.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key` and return the object's URL.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String>;

    /// Time-limited download URL for `key`.
    async fn signed_download_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Bucket the store writes to; used to recover keys from URLs.
    fn bucket(&self) -> &str;

    /// Recover the object key from a URL returned by [`ObjectStorage::upload`]
    /// or [`ObjectStorage::signed_download_url`].
    fn key_from_url(&self, url: &str) -> StorageResult<String> {
        key_from_url(url, self.bucket())
    }
}

/// Object key of a path-style URL `{endpoint}/{bucket}/{key}`.
///
/// The bucket segment is skipped when present; query strings (signatures)
/// are ignored.
pub fn key_from_url(url: &str, bucket: &str) -> StorageResult<String> {
    let parsed = Url::parse(url).map_err(|_| StorageError::invalid_url(url))?;
    let mut segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if segments.first() == Some(&bucket) {
        segments.remove(0);
    }
    if segments.is_empty() {
        return Err(StorageError::invalid_url(url));
    }
    Ok(segments.join("/"))
}
