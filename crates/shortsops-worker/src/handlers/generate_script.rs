//! Script generation from niche templates.

use shortsops_models::Stage;
use shortsops_queue::{GenerateScriptJob, QueueJob, SynthVoiceoverJob};
use shortsops_store::MediaItemUpdate;
use tracing::info;

use super::{admit, settle_media, Admission, HandlerOutcome};
use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::templates::render_script;

const STAGE: Stage = Stage::GenerateScript;

pub async fn handle(ctx: &PipelineContext, job: &GenerateScriptJob) -> WorkerResult<HandlerOutcome> {
    match admit(ctx, &job.media_item_id, STAGE).await? {
        Admission::Skip(reason) => Ok(HandlerOutcome::Skipped(reason)),
        Admission::Run(_) => {
            let result = run(ctx, job).await;
            settle_media(ctx, &job.media_item_id, STAGE, result).await
        }
    }
}

async fn run(ctx: &PipelineContext, job: &GenerateScriptJob) -> WorkerResult<()> {
    let script = render_script(&job.niche, job.hook.as_deref());

    ctx.store
        .update_media_item(&job.media_item_id, MediaItemUpdate::Script(script.clone()))
        .await?;

    ctx.queue
        .enqueue(QueueJob::SynthVoiceover(SynthVoiceoverJob {
            media_item_id: job.media_item_id.clone(),
            script,
            voice: ctx.settings.tts_voice.clone(),
            lang: job.lang.clone(),
        }))
        .await?;

    info!(media_item_id = %job.media_item_id, niche = %job.niche, "Script generated");
    Ok(())
}
