//! Publish one post task.

use shortsops_models::{PostStatus, PostTask};
use shortsops_providers::PostRequest;
use shortsops_queue::PostVideoJob;
use shortsops_store::PostTaskUpdate;
use tracing::{info, warn};

use super::{superseded, HandlerOutcome};
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::record_post;

const HASHTAGS: [&str; 2] = ["shorts", "viral"];

pub async fn handle(ctx: &PipelineContext, job: &PostVideoJob) -> WorkerResult<HandlerOutcome> {
    let task = ctx
        .store
        .get_post_task(&job.post_task_id)
        .await?
        .ok_or_else(|| WorkerError::not_found("post task", job.post_task_id.as_str()))?;

    if task.status == PostStatus::Posted {
        return Ok(HandlerOutcome::Skipped(format!(
            "post task {} already POSTED",
            task.id
        )));
    }

    match publish(ctx, &task).await {
        Ok(()) => {
            record_post(task.platform.as_str(), true);
            Ok(HandlerOutcome::Completed)
        }
        Err(err) => {
            if let Some(reason) = superseded(&err) {
                return Ok(HandlerOutcome::Skipped(reason));
            }
            record_post(task.platform.as_str(), false);
            if err.marks_failed() {
                let update = PostTaskUpdate::Failed {
                    error: err.to_string(),
                };
                if let Err(e) = ctx.store.update_post_task(&task.id, update).await {
                    warn!(post_task_id = %task.id, "Failed to mark post task FAILED: {}", e);
                }
            }
            Err(err)
        }
    }
}

async fn publish(ctx: &PipelineContext, task: &PostTask) -> WorkerResult<()> {
    let item = ctx
        .store
        .get_media_item(&task.media_item_id)
        .await?
        .ok_or_else(|| WorkerError::not_found("media item", task.media_item_id.as_str()))?;

    let video_url = item
        .render
        .as_ref()
        .map(|render| render.output_url.clone())
        .ok_or_else(|| WorkerError::VideoNotReady(item.id.to_string()))?;
    let script = item
        .script
        .as_ref()
        .ok_or_else(|| WorkerError::invalid_request("media item has no script"))?;

    let connection = ctx
        .store
        .find_connection(
            &item.account_id,
            task.platform,
            task.social_connection_id.as_ref(),
        )
        .await?
        .ok_or_else(|| WorkerError::NoConnection {
            account: item.account_id.to_string(),
            platform: task.platform,
        })?;
    let tokens = ctx.cipher.open(&connection.access)?;

    ctx.store
        .update_post_task(
            &task.id,
            PostTaskUpdate::StartPosting {
                lease: ctx.settings.post_lease,
            },
        )
        .await?;

    let receipt = ctx
        .poster
        .post_short(&PostRequest {
            platform: task.platform,
            tokens,
            video_url,
            title: script.hook.clone(),
            description: script.description(),
            hashtags: HASHTAGS.iter().map(|tag| tag.to_string()).collect(),
            publish_at: None,
        })
        .await?;

    ctx.store
        .update_post_task(
            &task.id,
            PostTaskUpdate::Posted {
                external_id: receipt.external_id.clone(),
                publish_url: receipt.publish_url.clone(),
            },
        )
        .await?;

    info!(
        post_task_id = %task.id,
        platform = task.platform.as_str(),
        external_id = %receipt.external_id,
        "Short posted"
    );
    Ok(())
}
