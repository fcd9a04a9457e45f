//! Social platform posting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::record_call;
use crate::traits::{PostReceipt, PostRequest, SocialPoster};

/// Simulated upload to every platform.
pub struct MockSocialPoster {
    latency: Duration,
    sequence: AtomicU64,
}

impl Default for MockSocialPoster {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl MockSocialPoster {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl SocialPoster for MockSocialPoster {
    async fn post_short(&self, request: &PostRequest) -> ProviderResult<PostReceipt> {
        let now = Utc::now();
        if request.tokens.is_expired(now) {
            record_call("mock-social", "post_short", false);
            return Err(ProviderError::credentials(format!(
                "{} access token expired",
                request.platform.as_str()
            )));
        }

        info!(
            platform = request.platform.as_str(),
            title = %request.title,
            hashtags = request.hashtags.len(),
            "Posting short (mock)"
        );

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let slug = request.platform.slug();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let external_id = format!("{}_{}_{}", slug, now.timestamp_millis(), seq);
        let publish_url = format!("https://mock-{}.com/shorts/{}", slug, external_id);

        record_call("mock-social", "post_short", true);
        Ok(PostReceipt {
            external_id,
            publish_url: Some(publish_url),
        })
    }
}
