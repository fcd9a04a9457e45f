//! Stage handlers.
//!
//! Each handler loads its entity, asks the state machine whether the stage
//! may run, does the work, persists a partial update and enqueues the next
//! stage. Errors after admission mark the entity FAILED before they are
//! returned to the executor.

pub mod build_captions;
pub mod generate_script;
pub mod post_video;
pub mod render_video;
pub mod schedule_posts;
pub mod synth_voiceover;

use shortsops_models::{MediaItem, MediaItemId, Stage};
use shortsops_queue::QueueJob;
use shortsops_store::{MediaItemUpdate, StoreError};
use tokio::sync::watch;
use tracing::warn;

use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};

/// How a delivery ended when the handler did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    /// The entity's state no longer admits this stage; the delivery is
    /// acknowledged without doing anything.
    Skipped(String),
}

/// Run the handler for `payload`. `cancel` flips to true on shutdown.
pub async fn dispatch(
    ctx: &PipelineContext,
    payload: &QueueJob,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<HandlerOutcome> {
    match payload {
        QueueJob::GenerateScript(job) => generate_script::handle(ctx, job).await,
        QueueJob::SynthVoiceover(job) => synth_voiceover::handle(ctx, job).await,
        QueueJob::BuildCaptions(job) => build_captions::handle(ctx, job).await,
        QueueJob::RenderVideo(job) => render_video::handle(ctx, job, cancel).await,
        QueueJob::SchedulePosts(job) => schedule_posts::handle(ctx, job).await,
        QueueJob::PostVideo(job) => post_video::handle(ctx, job).await,
    }
}

pub(crate) enum Admission {
    Run(MediaItem),
    Skip(String),
}

/// Fresh read of the media item plus the state machine's admission check.
pub(crate) async fn admit(
    ctx: &PipelineContext,
    id: &MediaItemId,
    stage: Stage,
) -> WorkerResult<Admission> {
    let item = ctx
        .store
        .get_media_item(id)
        .await?
        .ok_or_else(|| WorkerError::not_found("media item", id.as_str()))?;

    Ok(match item.admits(stage) {
        Ok(()) => Admission::Run(item),
        Err(reason) => Admission::Skip(reason.to_string()),
    })
}

/// Turn the result of an admitted media stage into the handler result.
///
/// A state-machine rejection means another delivery moved the item on in
/// the meantime and is treated as a skip. Other errors mark the item FAILED
/// at `stage` and are passed through.
pub(crate) async fn settle_media(
    ctx: &PipelineContext,
    id: &MediaItemId,
    stage: Stage,
    result: WorkerResult<()>,
) -> WorkerResult<HandlerOutcome> {
    match result {
        Ok(()) => Ok(HandlerOutcome::Completed),
        Err(err) => {
            if let Some(reason) = superseded(&err) {
                return Ok(HandlerOutcome::Skipped(reason));
            }
            if err.marks_failed() {
                let update = MediaItemUpdate::fail(stage, err.to_string());
                if let Err(e) = ctx.store.update_media_item(id, update).await {
                    warn!(
                        media_item_id = %id,
                        stage = stage.as_str(),
                        "Failed to mark media item FAILED: {}", e
                    );
                }
            }
            Err(err)
        }
    }
}

/// Rejection reason when `err` is a state-machine refusal.
pub(crate) fn superseded(err: &WorkerError) -> Option<String> {
    match err {
        WorkerError::Store(StoreError::Transition(e)) => Some(e.to_string()),
        WorkerError::Store(StoreError::PostTransition(e)) => Some(e.to_string()),
        _ => None,
    }
}
