//! Video rendering through the selected provider.
//!
//! The handler requires both the voiceover and the caption track, moves the
//! item to RENDERING, starts the provider job and polls its status until it
//! reaches a terminal state or the poll budget runs out.

use shortsops_models::{AssetKind, MediaItem, RenderJobId, RenderResult, Stage, VideoTarget};
use shortsops_providers::{RenderRequest, RenderState, VideoRenderer, RENDER_DURATION_SECS};
use shortsops_queue::RenderVideoJob;
use shortsops_store::MediaItemUpdate;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{admit, settle_media, Admission, HandlerOutcome};
use crate::config::PollPolicy;
use crate::context::PipelineContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::record_render_poll;

const STAGE: Stage = Stage::RenderVideo;

const REQUIRED_ASSETS: [AssetKind; 2] = [AssetKind::TtsUrl, AssetKind::SrtUrl];

pub async fn handle(
    ctx: &PipelineContext,
    job: &RenderVideoJob,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<HandlerOutcome> {
    match admit(ctx, &job.media_item_id, STAGE).await? {
        Admission::Skip(reason) => Ok(HandlerOutcome::Skipped(reason)),
        Admission::Run(item) => {
            let result = run(ctx, job, item, cancel).await;
            settle_media(ctx, &job.media_item_id, STAGE, result).await
        }
    }
}

async fn run(
    ctx: &PipelineContext,
    job: &RenderVideoJob,
    item: MediaItem,
    cancel: watch::Receiver<bool>,
) -> WorkerResult<()> {
    let (tts_url, srt_url) = match (
        item.assets.get(AssetKind::TtsUrl),
        item.assets.get(AssetKind::SrtUrl),
    ) {
        (Some(tts), Some(srt)) => (tts.to_string(), srt.to_string()),
        _ => {
            return Err(WorkerError::MissingAssets {
                media_item_id: item.id.to_string(),
                missing: item.assets.missing(&REQUIRED_ASSETS),
            })
        }
    };
    let script = item
        .script
        .clone()
        .ok_or_else(|| WorkerError::invalid_request("media item has no script"))?;
    let renderer = ctx
        .renderers
        .get(&job.provider)
        .ok_or_else(|| WorkerError::UnknownProvider(job.provider.clone()))?;

    let srt_key = ctx.storage.key_from_url(&srt_url)?;
    let captions = ctx.storage.download(&srt_key).await?;
    let captions_srt = String::from_utf8_lossy(&captions).into_owned();

    ctx.store
        .update_media_item(&item.id, MediaItemUpdate::StartRender)
        .await?;

    let render_job_id = renderer
        .create_render(RenderRequest {
            script,
            tts_url,
            captions_srt,
            target: VideoTarget::SHORTS,
            overlays: job.overlays.clone(),
            watermark: job.watermark.clone(),
        })
        .await?;
    info!(
        media_item_id = %item.id,
        provider = %job.provider,
        render_job_id = %render_job_id,
        "Render started"
    );

    let output_url = poll_render(
        renderer.as_ref(),
        &render_job_id,
        ctx.settings.render_poll,
        &job.provider,
        cancel,
    )
    .await?;

    ctx.store
        .update_media_item(
            &item.id,
            MediaItemUpdate::CompleteRender {
                render: RenderResult {
                    provider: job.provider.clone(),
                    job_id: render_job_id,
                    output_url: output_url.clone(),
                },
                duration_sec: RENDER_DURATION_SECS,
            },
        )
        .await?;

    info!(media_item_id = %item.id, output_url = %output_url, "Render complete");
    Ok(())
}

/// Poll `job_id` until it succeeds, fails or `policy` is exhausted.
///
/// Status is checked before every wait, so a job that is already done costs
/// no interval. Returns `Cancelled` as soon as `cancel` turns true.
pub async fn poll_render(
    renderer: &dyn VideoRenderer,
    job_id: &RenderJobId,
    policy: PollPolicy,
    provider: &str,
    mut cancel: watch::Receiver<bool>,
) -> WorkerResult<String> {
    for attempt in 1..=policy.max_attempts {
        if *cancel.borrow() {
            return Err(WorkerError::Cancelled);
        }

        let status = renderer.get_status(job_id).await?;
        record_render_poll(provider, status.state.as_str());

        match status.state {
            RenderState::Succeeded => {
                return status.output_url.ok_or_else(|| {
                    WorkerError::RenderFailed(format!("render {} finished without output", job_id))
                });
            }
            RenderState::Failed => {
                return Err(WorkerError::RenderFailed(
                    status.error.unwrap_or_else(|| "unknown render error".to_string()),
                ));
            }
            RenderState::Queued | RenderState::Running => {
                debug!(
                    render_job_id = %job_id,
                    attempt,
                    state = status.state.as_str(),
                    "Render still in progress"
                );
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = wait_for_cancel(&mut cancel) => return Err(WorkerError::Cancelled),
            }
        }
    }

    Err(WorkerError::RenderTimeout {
        job_id: job_id.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Resolves once `cancel` holds true. Never resolves if the sender is gone.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::mock;
    use shortsops_models::{AssetBundle, MediaStatus, ScriptParts};
    use shortsops_providers::{ProviderError, ProviderResult, RenderStatus};
    use shortsops_storage::ObjectStorage;

    use crate::handlers::testing::Harness;

    mock! {
        pub Renderer {}

        #[async_trait]
        impl VideoRenderer for Renderer {
            async fn create_render(&self, request: RenderRequest) -> ProviderResult<RenderJobId>;
            async fn get_status(&self, job_id: &RenderJobId) -> ProviderResult<RenderStatus>;
        }
    }

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    /// Item with script, voiceover and an uploaded caption track.
    async fn prepared_item(h: &Harness) -> MediaItem {
        let item = h.media_item().await;
        let srt_url = h
            .storage
            .upload("captions/test.srt", b"1\n00:00:00,000 --> 00:00:05,000\nhi\n".to_vec(), "text/plain")
            .await
            .unwrap();
        let updates = [
            MediaItemUpdate::Script(ScriptParts::new("Hook", "Body", "Follow")),
            MediaItemUpdate::MergeAssets {
                stage: Stage::SynthVoiceover,
                assets: AssetBundle::tts("http://storage.local/shortsops/tts/a.mp3"),
            },
            MediaItemUpdate::MergeAssets {
                stage: Stage::BuildCaptions,
                assets: AssetBundle::srt(srt_url),
            },
        ];
        for update in updates {
            h.ctx.store.update_media_item(&item.id, update).await.unwrap();
        }
        h.reload(&item).await
    }

    fn render_job(item: &MediaItem, provider: &str) -> RenderVideoJob {
        RenderVideoJob::new(item.id.clone(), provider)
    }

    #[tokio::test]
    async fn test_hosted_render_reaches_ready() {
        let h = Harness::new();
        let item = prepared_item(&h).await;

        let outcome = handle(&h.ctx, &render_job(&item, "InVideo"), no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Completed);

        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Ready);
        assert_eq!(stored.duration_sec, Some(10));
        let render = stored.render.unwrap();
        assert_eq!(render.provider, "InVideo");
        assert!(render.job_id.as_str().starts_with("invideo_"));
        assert!(render.output_url.starts_with("https://mock-invideo-cdn.com/"));
    }

    #[tokio::test]
    async fn test_missing_assets_never_calls_provider() {
        let mut h = Harness::new();
        let item = h.media_item().await;
        h.ctx
            .store
            .update_media_item(
                &item.id,
                MediaItemUpdate::MergeAssets {
                    stage: Stage::SynthVoiceover,
                    assets: AssetBundle::tts("http://storage.local/shortsops/tts/a.mp3"),
                },
            )
            .await
            .unwrap();

        let mut renderer = MockRenderer::new();
        renderer.expect_create_render().times(0);
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));

        let err = handle(&h.ctx, &render_job(&item, "mock"), no_cancel())
            .await
            .unwrap_err();
        match &err {
            WorkerError::MissingAssets { missing, .. } => {
                assert_eq!(missing, &vec![AssetKind::SrtUrl]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!err.is_retryable());

        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Failed);
        assert_eq!(stored.failed_stage, Some(Stage::RenderVideo));
        assert!(stored.error.unwrap().contains("srtUrl"));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let h = Harness::new();
        let item = prepared_item(&h).await;

        let err = handle(&h.ctx, &render_job(&item, "pixar"), no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownProvider(_)));
        assert_eq!(h.reload(&item).await.status, MediaStatus::Failed);
    }

    #[tokio::test]
    async fn test_render_timeout_marks_failed() {
        let mut h = Harness::new();
        let item = prepared_item(&h).await;

        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let mut renderer = MockRenderer::new();
        renderer
            .expect_create_render()
            .times(1)
            .returning(|_| Ok(RenderJobId::from("stuck-1")));
        renderer.expect_get_status().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RenderStatus::pending(RenderState::Running))
        });
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));

        let err = handle(&h.ctx, &render_job(&item, "mock"), no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::RenderTimeout { attempts: 3, .. }));
        assert!(!err.is_retryable());
        assert_eq!(polls.load(Ordering::SeqCst), 3);

        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Failed);
        assert_eq!(stored.failed_stage, Some(Stage::RenderVideo));
    }

    #[tokio::test]
    async fn test_running_then_succeeded_reaches_ready() {
        let mut h = Harness::new();
        let item = prepared_item(&h).await;

        let mut renderer = MockRenderer::new();
        renderer
            .expect_create_render()
            .times(1)
            .withf(|r| {
                r.watermark.as_deref() == Some("http://storage.local/shortsops/brand/mark.png")
                    && r.overlays.is_empty()
                    && r.captions_srt.contains("hi")
            })
            .returning(|_| Ok(RenderJobId::from("r-2")));
        let mut seq = mockall::Sequence::new();
        renderer
            .expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RenderStatus::pending(RenderState::Running)));
        renderer
            .expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RenderStatus::succeeded("http://cdn/r-2.mp4")));
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));

        let job = RenderVideoJob {
            watermark: Some("http://storage.local/shortsops/brand/mark.png".to_string()),
            ..render_job(&item, "mock")
        };
        let outcome = handle(&h.ctx, &job, no_cancel()).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Completed);

        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Ready);
        let render = stored.render.unwrap();
        assert_eq!(render.job_id.as_str(), "r-2");
        assert_eq!(render.output_url, "http://cdn/r-2.mp4");
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable_and_rerun_succeeds() {
        let mut h = Harness::new();
        let item = prepared_item(&h).await;

        let mut renderer = MockRenderer::new();
        renderer
            .expect_create_render()
            .returning(|_| Ok(RenderJobId::from("r-1")));
        let mut seq = mockall::Sequence::new();
        renderer
            .expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RenderStatus::failed("encoder crashed")));
        renderer
            .expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(RenderStatus::succeeded("http://cdn/r-1.mp4")));
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));

        let err = handle(&h.ctx, &render_job(&item, "mock"), no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::RenderFailed(ref m) if m == "encoder crashed"));
        assert!(err.is_retryable());
        assert_eq!(h.reload(&item).await.status, MediaStatus::Failed);

        // redelivery of the failed stage is admitted
        let outcome = handle(&h.ctx, &render_job(&item, "mock"), no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Completed);
        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Ready);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_ready_item_is_skipped() {
        let mut h = Harness::new();
        let item = prepared_item(&h).await;
        handle(&h.ctx, &render_job(&item, "invideo"), no_cancel())
            .await
            .unwrap();

        let mut renderer = MockRenderer::new();
        renderer.expect_create_render().times(0);
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));

        let outcome = handle(&h.ctx, &render_job(&item, "mock"), no_cancel())
            .await
            .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_poll_job_not_found() {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_get_status()
            .returning(|id| Err(ProviderError::JobNotFound(id.to_string())));

        let err = poll_render(&renderer, &RenderJobId::from("gone"), policy(5), "mock", no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_get_status()
            .returning(|_| Ok(RenderStatus::pending(RenderState::Queued)));

        let (tx, rx) = watch::channel(false);
        let slow = PollPolicy {
            interval: Duration::from_secs(60),
            max_attempts: 10,
        };
        let poll = tokio::spawn(async move {
            poll_render(&renderer, &RenderJobId::from("r"), slow, "mock", rx).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), poll)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(WorkerError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_render_leaves_item_rendering() {
        let mut h = Harness::new();
        let item = prepared_item(&h).await;

        let mut renderer = MockRenderer::new();
        renderer
            .expect_create_render()
            .returning(|_| Ok(RenderJobId::from("r-2")));
        renderer
            .expect_get_status()
            .returning(|_| Ok(RenderStatus::pending(RenderState::Running)));
        h.ctx.renderers = h.ctx.renderers.clone().with("mock", Arc::new(renderer));
        h.ctx.settings.render_poll = PollPolicy {
            interval: Duration::from_secs(60),
            max_attempts: 10,
        };

        let (tx, rx) = watch::channel(false);
        let ctx = h.ctx.clone();
        let job = render_job(&item, "mock");
        let task = tokio::spawn(async move { handle(&ctx, &job, rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, WorkerError::Cancelled));
        assert!(err.is_retryable());
        assert_eq!(h.reload(&item).await.status, MediaStatus::Rendering);
    }
}
