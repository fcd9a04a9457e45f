//! Fan a media item out to one post task per platform.

use chrono::Utc;
use shortsops_models::{PostStatus, PostTask};
use shortsops_queue::{PostVideoJob, QueueJob, SchedulePostsJob};
use tracing::{debug, info};

use super::HandlerOutcome;
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};

/// Task ids derive from the request id, so a redelivered job finds the tasks
/// it already created instead of adding new ones. The media item itself is
/// only read.
pub async fn handle(ctx: &PipelineContext, job: &SchedulePostsJob) -> WorkerResult<HandlerOutcome> {
    if job.platforms.is_empty() {
        return Err(WorkerError::invalid_request("no platforms to schedule"));
    }

    let item = ctx
        .store
        .get_media_item(&job.media_item_id)
        .await?
        .ok_or_else(|| WorkerError::not_found("media item", job.media_item_id.as_str()))?;

    let now = Utc::now();
    let mut enqueued = 0usize;

    for entry in &job.platforms {
        let candidate = PostTask::new(
            &job.request_id,
            item.id.clone(),
            entry.platform,
            entry.social_connection_id.clone(),
            entry.scheduled_at,
        );
        let (task, created) = ctx.store.create_post_task_if_absent(&candidate).await?;

        if task.status != PostStatus::Scheduled {
            debug!(
                post_task_id = %task.id,
                status = task.status.as_str(),
                "Post task already past SCHEDULED"
            );
            continue;
        }

        let payload = QueueJob::PostVideo(PostVideoJob {
            post_task_id: task.id.clone(),
        });
        if task.scheduled_at > now {
            ctx.queue.enqueue_at(payload, task.scheduled_at).await?;
        } else {
            ctx.queue.enqueue(payload).await?;
        }
        enqueued += 1;

        debug!(
            post_task_id = %task.id,
            platform = task.platform.as_str(),
            scheduled_at = %task.scheduled_at,
            created,
            "Post task scheduled"
        );
    }

    info!(
        media_item_id = %item.id,
        request_id = %job.request_id,
        platform_count = job.platforms.len(),
        enqueued,
        "Posts scheduled"
    );
    Ok(HandlerOutcome::Completed)
}
