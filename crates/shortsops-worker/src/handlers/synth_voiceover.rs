//! Voiceover synthesis.

use shortsops_models::{AssetBundle, Stage};
use shortsops_providers::SynthesisRequest;
use shortsops_queue::{BuildCaptionsJob, QueueJob, SynthVoiceoverJob};
use shortsops_store::MediaItemUpdate;
use tracing::info;

use super::{admit, settle_media, Admission, HandlerOutcome};
use crate::context::PipelineContext;
use crate::error::WorkerResult;

const STAGE: Stage = Stage::SynthVoiceover;

pub async fn handle(ctx: &PipelineContext, job: &SynthVoiceoverJob) -> WorkerResult<HandlerOutcome> {
    match admit(ctx, &job.media_item_id, STAGE).await? {
        Admission::Skip(reason) => Ok(HandlerOutcome::Skipped(reason)),
        Admission::Run(_) => {
            let result = run(ctx, job).await;
            settle_media(ctx, &job.media_item_id, STAGE, result).await
        }
    }
}

async fn run(ctx: &PipelineContext, job: &SynthVoiceoverJob) -> WorkerResult<()> {
    let utterance = job.script.utterance();

    let output = ctx
        .tts
        .synthesize(&SynthesisRequest {
            text: utterance.clone(),
            voice: job.voice.clone(),
            lang: job.lang.clone(),
            ssml: false,
        })
        .await?;

    ctx.store
        .update_media_item(
            &job.media_item_id,
            MediaItemUpdate::MergeAssets {
                stage: STAGE,
                assets: AssetBundle::tts(output.audio_url.clone()),
            },
        )
        .await?;

    ctx.queue
        .enqueue(QueueJob::BuildCaptions(BuildCaptionsJob {
            media_item_id: job.media_item_id.clone(),
            audio_url: output.audio_url.clone(),
            script: utterance,
        }))
        .await?;

    info!(
        media_item_id = %job.media_item_id,
        audio_url = %output.audio_url,
        "Voiceover synthesized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use mockall::mock;
    use shortsops_models::{MediaStatus, ScriptParts};
    use shortsops_providers::{ProviderError, ProviderResult, SynthesisOutput, TextToSpeech};
    use shortsops_storage::ObjectStorage;

    use crate::error::WorkerError;
    use crate::handlers::testing::Harness;

    mock! {
        pub Speech {}

        #[async_trait]
        impl TextToSpeech for Speech {
            async fn synthesize(&self, request: &SynthesisRequest) -> ProviderResult<SynthesisOutput>;
        }
    }

    fn job_for(id: &shortsops_models::MediaItemId) -> SynthVoiceoverJob {
        SynthVoiceoverJob {
            media_item_id: id.clone(),
            script: ScriptParts::new("Hook", "Body text", "Follow!"),
            voice: "default".to_string(),
            lang: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_uploads_audio_and_enqueues_captions() {
        let h = Harness::new();
        let item = h.media_item().await;

        let outcome = handle(&h.ctx, &job_for(&item.id)).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Completed);

        let stored = h.reload(&item).await;
        let tts_url = stored.assets.tts_url.clone().unwrap();
        assert!(tts_url.contains("/tts/"));

        let key = h.storage.key_from_url(&tts_url).unwrap();
        let object = h.storage.get(&key).await.unwrap();
        assert_eq!(object.content_type, "audio/mpeg");

        let next = h.queue.pending_payloads(Stage::BuildCaptions).await;
        match next.as_slice() {
            [QueueJob::BuildCaptions(j)] => {
                assert_eq!(j.audio_url, tts_url);
                assert_eq!(j.script, "Hook. Body text. Follow!");
            }
            other => panic!("unexpected jobs {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_passes_plain_text_request() {
        let mut h = Harness::new();
        let item = h.media_item().await;

        let mut speech = MockSpeech::new();
        speech
            .expect_synthesize()
            .withf(|req| !req.ssml && req.voice == "default" && req.text.starts_with("Hook."))
            .times(1)
            .returning(|_| {
                Ok(SynthesisOutput {
                    audio_url: "http://storage.local/shortsops/tts/fixed.mp3".to_string(),
                })
            });
        h.ctx.tts = Arc::new(speech);

        handle(&h.ctx, &job_for(&item.id)).await.unwrap();
        let stored = h.reload(&item).await;
        assert_eq!(
            stored.assets.tts_url.as_deref(),
            Some("http://storage.local/shortsops/tts/fixed.mp3")
        );
    }

    #[tokio::test]
    async fn test_provider_failure_marks_failed() {
        let mut h = Harness::new();
        let item = h.media_item().await;

        let mut speech = MockSpeech::new();
        speech
            .expect_synthesize()
            .returning(|_| Err(ProviderError::rejected("quota exceeded")));
        h.ctx.tts = Arc::new(speech);

        let err = handle(&h.ctx, &job_for(&item.id)).await.unwrap_err();
        assert!(matches!(err, WorkerError::Provider(_)));
        assert!(err.is_retryable());

        let stored = h.reload(&item).await;
        assert_eq!(stored.status, MediaStatus::Failed);
        assert_eq!(stored.failed_stage, Some(STAGE));
        assert!(stored.error.unwrap().contains("quota exceeded"));
        assert!(h.queue.pending_payloads(Stage::BuildCaptions).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_at_other_stage_is_skipped() {
        let h = Harness::new();
        let item = h.media_item().await;
        h.ctx
            .store
            .update_media_item(&item.id, MediaItemUpdate::fail(Stage::GenerateScript, "boom"))
            .await
            .unwrap();

        let outcome = handle(&h.ctx, &job_for(&item.id)).await.unwrap();
        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
        assert!(h.storage.keys().await.is_empty());
    }
}
