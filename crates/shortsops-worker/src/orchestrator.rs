//! Pipeline entry points.
//!
//! Generation and scheduling are the two external triggers; everything in
//! between is driven by the stage handlers.

use std::sync::Arc;

use shortsops_models::{CampaignId, JobId, MediaItem, MediaItemId, Stage};
use shortsops_queue::{GenerateScriptJob, JobHandle, JobQueue, PlatformSchedule, QueueJob, SchedulePostsJob};
use shortsops_store::PipelineStore;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::{WorkerError, WorkerResult};

/// Most media items a single generate call may create.
pub const MAX_BATCH: u32 = 10;

#[derive(Debug, Validate)]
struct GenerateRequest {
    #[validate(range(min = 1, max = 10))]
    count: u32,
}

#[derive(Debug, Validate)]
struct ScheduleRequest {
    #[validate(length(min = 1, message = "at least one platform is required"))]
    platforms: Vec<PlatformSchedule>,
}

/// Starts pipelines and recovers dead-lettered jobs.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn PipelineStore>,
    queue: Arc<dyn JobQueue>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn PipelineStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Create `count` PENDING media items for a campaign and start the
    /// script stage for each.
    pub async fn generate(&self, campaign_id: &CampaignId, count: u32) -> WorkerResult<Vec<MediaItemId>> {
        GenerateRequest { count }
            .validate()
            .map_err(|e| WorkerError::invalid_request(e.to_string()))?;

        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| WorkerError::not_found("campaign", campaign_id.as_str()))?;

        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let item = MediaItem::new(
                campaign.account_id.clone(),
                Some(campaign.id.clone()),
                campaign.primary_lang.clone(),
            );
            self.store.insert_media_item(&item).await?;
            self.queue
                .enqueue(QueueJob::GenerateScript(GenerateScriptJob::new(
                    item.id.clone(),
                    campaign.niche.clone(),
                    campaign.primary_lang.clone(),
                )))
                .await?;
            ids.push(item.id);
        }

        info!(
            campaign_id = %campaign.id,
            niche = %campaign.niche,
            count,
            "Generation started"
        );
        Ok(ids)
    }

    /// Request posting of a media item. Returns the request id that the
    /// post task ids derive from.
    pub async fn schedule(
        &self,
        media_item_id: &MediaItemId,
        platforms: Vec<PlatformSchedule>,
    ) -> WorkerResult<String> {
        let request = ScheduleRequest { platforms };
        request
            .validate()
            .map_err(|e| WorkerError::invalid_request(e.to_string()))?;
        let ScheduleRequest { platforms } = request;

        if self.store.get_media_item(media_item_id).await?.is_none() {
            return Err(WorkerError::not_found("media item", media_item_id.as_str()));
        }

        let request_id = Uuid::new_v4().to_string();
        let platform_count = platforms.len();
        self.queue
            .enqueue(QueueJob::SchedulePosts(SchedulePostsJob {
                media_item_id: media_item_id.clone(),
                request_id: request_id.clone(),
                platforms,
            }))
            .await?;

        info!(
            media_item_id = %media_item_id,
            request_id = %request_id,
            platform_count,
            "Scheduling requested"
        );
        Ok(request_id)
    }

    /// Re-enqueue a dead-lettered job on the queue it failed in.
    pub async fn retry_failed(&self, queue: Stage, job_id: &JobId) -> WorkerResult<JobHandle> {
        let handle = self.queue.retry_failed(queue, job_id).await?;
        info!(queue = queue.as_str(), job_id = %job_id, "Failed job re-enqueued");
        Ok(handle)
    }
}
