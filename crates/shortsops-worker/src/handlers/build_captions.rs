//! Caption track generation.

use shortsops_models::{AssetBundle, Stage};
use shortsops_queue::{BuildCaptionsJob, QueueJob, RenderVideoJob};
use shortsops_store::MediaItemUpdate;
use tracing::info;
use uuid::Uuid;

use super::{admit, settle_media, Admission, HandlerOutcome};
use crate::captions::{build_srt, ESTIMATED_DURATION_SECS};
use crate::context::PipelineContext;
use crate::error::WorkerResult;

const STAGE: Stage = Stage::BuildCaptions;

const SRT_CONTENT_TYPE: &str = "text/plain";

pub async fn handle(ctx: &PipelineContext, job: &BuildCaptionsJob) -> WorkerResult<HandlerOutcome> {
    match admit(ctx, &job.media_item_id, STAGE).await? {
        Admission::Skip(reason) => Ok(HandlerOutcome::Skipped(reason)),
        Admission::Run(_) => {
            let result = run(ctx, job).await;
            settle_media(ctx, &job.media_item_id, STAGE, result).await
        }
    }
}

async fn run(ctx: &PipelineContext, job: &BuildCaptionsJob) -> WorkerResult<()> {
    let srt = build_srt(&job.script, ESTIMATED_DURATION_SECS);
    let key = format!("captions/{}.srt", Uuid::new_v4());

    let srt_url = ctx
        .storage
        .upload(&key, srt.into_bytes(), SRT_CONTENT_TYPE)
        .await?;

    ctx.store
        .update_media_item(
            &job.media_item_id,
            MediaItemUpdate::MergeAssets {
                stage: STAGE,
                assets: AssetBundle::srt(srt_url.clone()),
            },
        )
        .await?;

    ctx.queue
        .enqueue(QueueJob::RenderVideo(RenderVideoJob {
            watermark: ctx.settings.watermark.clone(),
            ..RenderVideoJob::new(job.media_item_id.clone(), ctx.settings.render_provider.clone())
        }))
        .await?;

    info!(media_item_id = %job.media_item_id, srt_url = %srt_url, "Captions built");
    Ok(())
}
