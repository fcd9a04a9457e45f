//! End-to-end pipeline runs against the in-memory backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use shortsops_models::{
    AccountId, AssetKind, Campaign, MediaItem, MediaItemId, MediaStatus, Platform, PostResult,
    PostStatus, SocialConnection, Stage, TokenBundle,
};
use shortsops_providers::{
    CredentialCipher, HostedRenderer, MockSocialPoster, MockTts, RendererRegistry,
};
use shortsops_queue::{JobQueue, MemoryJobQueue, PlatformSchedule};
use shortsops_storage::MemoryStorage;
use shortsops_store::{MemoryStore, PipelineStore};
use shortsops_worker::{
    dispatch, HandlerOutcome, JobExecutor, Orchestrator, PipelineContext, PipelineSettings,
    PollPolicy, WorkerConfig, WorkerError,
};
use tokio::sync::watch;

struct Pipeline {
    ctx: PipelineContext,
    store: Arc<MemoryStore>,
    queue: Arc<MemoryJobQueue>,
    orchestrator: Orchestrator,
    account: AccountId,
}

impl Pipeline {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let storage = Arc::new(MemoryStorage::default());
        let ctx = PipelineContext {
            store: store.clone(),
            queue: queue.clone(),
            storage: storage.clone(),
            tts: Arc::new(MockTts::new(storage)),
            renderers: RendererRegistry::new()
                .with("invideo", Arc::new(HostedRenderer::invideo()))
                .with("sora", Arc::new(HostedRenderer::sora(false))),
            poster: Arc::new(MockSocialPoster::new(Duration::ZERO)),
            cipher: CredentialCipher::from_secret("e2e-secret"),
            settings: PipelineSettings {
                tts_voice: "default".to_string(),
                render_provider: "invideo".to_string(),
                render_poll: PollPolicy {
                    interval: Duration::from_millis(5),
                    max_attempts: 5,
                },
                post_lease: Duration::from_secs(300),
                watermark: None,
            },
        };
        let orchestrator = Orchestrator::new(store.clone(), queue.clone());
        Self {
            ctx,
            store,
            queue,
            orchestrator,
            account: AccountId::from("acct-e2e"),
        }
    }

    async fn campaign(&self, niche: &str) -> Campaign {
        let campaign = Campaign::new(self.account.clone(), niche, "en");
        self.store.insert_campaign(&campaign).await.unwrap();
        campaign
    }

    async fn connect(&self, platform: Platform) {
        let sealed = self.ctx.cipher.seal(&TokenBundle::new("token")).unwrap();
        let connection = SocialConnection::new(self.account.clone(), platform, sealed);
        self.store.insert_connection(&connection).await.unwrap();
    }

    async fn item(&self, id: &MediaItemId) -> MediaItem {
        self.store.get_media_item(id).await.unwrap().unwrap()
    }

    /// Reserve and run every due job of `stage`, delivering each payload
    /// `deliveries` times before acknowledging it.
    async fn drain(&self, stage: Stage, deliveries: usize) -> Vec<HandlerOutcome> {
        let mut outcomes = Vec::new();
        let jobs = self.queue.reserve(stage, "e2e", 100).await.unwrap();
        for job in jobs {
            for _ in 0..deliveries {
                let (_tx, rx) = watch::channel(false);
                outcomes.push(dispatch(&self.ctx, &job.payload, rx).await.unwrap());
            }
            self.queue.complete(&job).await.unwrap();
        }
        outcomes
    }

    async fn run_media_stages(&self, deliveries: usize) {
        for stage in [
            Stage::GenerateScript,
            Stage::SynthVoiceover,
            Stage::BuildCaptions,
            Stage::RenderVideo,
        ] {
            self.drain(stage, deliveries).await;
        }
    }
}

fn now_on(platform: Platform) -> PlatformSchedule {
    PlatformSchedule {
        platform,
        social_connection_id: None,
        scheduled_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_generate_to_posted() {
    let p = Pipeline::new();
    let campaign = p.campaign("fitness").await;
    p.connect(Platform::Youtube).await;
    p.connect(Platform::Tiktok).await;

    let ids = p.orchestrator.generate(&campaign.id, 1).await.unwrap();
    p.run_media_stages(1).await;

    let item = p.item(&ids[0]).await;
    assert_eq!(item.status, MediaStatus::Ready);
    assert!(item.script.as_ref().unwrap().hook.contains("5 minutes"));
    assert!(item
        .assets
        .missing(&[AssetKind::TtsUrl, AssetKind::SrtUrl])
        .is_empty());
    assert_eq!(item.duration_sec, Some(10));
    assert!(item.render.is_some());

    p.orchestrator
        .schedule(&item.id, vec![now_on(Platform::Youtube), now_on(Platform::Tiktok)])
        .await
        .unwrap();
    p.drain(Stage::SchedulePosts, 1).await;
    let outcomes = p.drain(Stage::PostVideo, 1).await;
    assert_eq!(outcomes, vec![HandlerOutcome::Completed, HandlerOutcome::Completed]);

    let tasks = p.store.post_tasks_for(&item.id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        assert_eq!(task.status, PostStatus::Posted);
        assert!(task
            .external_id()
            .unwrap()
            .starts_with(task.platform.slug()));
    }
    assert_ne!(tasks[0].external_id(), tasks[1].external_id());
}

#[tokio::test]
async fn test_missing_connection_fails_only_its_platform() {
    let p = Pipeline::new();
    let campaign = p.campaign("fitness").await;
    p.connect(Platform::Youtube).await;

    let ids = p.orchestrator.generate(&campaign.id, 1).await.unwrap();
    p.run_media_stages(1).await;
    p.orchestrator
        .schedule(&ids[0], vec![now_on(Platform::Youtube), now_on(Platform::Tiktok)])
        .await
        .unwrap();
    p.drain(Stage::SchedulePosts, 1).await;

    let jobs = p.queue.reserve(Stage::PostVideo, "e2e", 10).await.unwrap();
    assert_eq!(jobs.len(), 2);
    let mut errors = Vec::new();
    for job in &jobs {
        let (_tx, rx) = watch::channel(false);
        match dispatch(&p.ctx, &job.payload, rx).await {
            Ok(outcome) => assert_eq!(outcome, HandlerOutcome::Completed),
            Err(err) => errors.push(err),
        }
    }
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        WorkerError::NoConnection {
            platform: Platform::Tiktok,
            ..
        }
    ));
    assert!(!errors[0].is_retryable());

    let tasks = p.store.post_tasks_for(&ids[0]).await.unwrap();
    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        match task.platform {
            Platform::Youtube => {
                assert_eq!(task.status, PostStatus::Posted);
                assert!(task.external_id().unwrap().starts_with("youtube"));
            }
            Platform::Tiktok => {
                assert_eq!(task.status, PostStatus::Failed);
                match &task.result {
                    Some(PostResult::Error { error }) => {
                        assert!(error.contains("No TIKTOK connection"), "{}", error)
                    }
                    other => panic!("unexpected result {:?}", other),
                }
            }
            other => panic!("unexpected platform {:?}", other),
        }
    }
    // the media item is untouched by either outcome
    assert_eq!(p.item(&ids[0]).await.status, MediaStatus::Ready);
}

#[tokio::test]
async fn test_redelivered_jobs_are_idempotent() {
    let p = Pipeline::new();
    let campaign = p.campaign("crypto").await;
    p.connect(Platform::Instagram).await;

    let ids = p.orchestrator.generate(&campaign.id, 1).await.unwrap();
    p.run_media_stages(2).await;

    let item = p.item(&ids[0]).await;
    assert_eq!(item.status, MediaStatus::Ready);
    assert!(item
        .assets
        .missing(&[AssetKind::TtsUrl, AssetKind::SrtUrl])
        .is_empty());

    p.orchestrator
        .schedule(&item.id, vec![now_on(Platform::Instagram)])
        .await
        .unwrap();
    p.drain(Stage::SchedulePosts, 2).await;

    // both schedule deliveries share one task
    let tasks = p.store.post_tasks_for(&item.id).await.unwrap();
    assert_eq!(tasks.len(), 1);

    let outcomes = p.drain(Stage::PostVideo, 2).await;
    let posted = outcomes
        .iter()
        .filter(|o| **o == HandlerOutcome::Completed)
        .count();
    assert_eq!(posted, 1, "task must be posted exactly once: {:?}", outcomes);

    let task = p.store.post_tasks_for(&item.id).await.unwrap().remove(0);
    assert_eq!(task.status, PostStatus::Posted);
    assert_eq!(task.attempts, 1);
}

#[tokio::test]
async fn test_future_schedule_is_delayed() {
    let p = Pipeline::new();
    let campaign = p.campaign("travel").await;
    p.connect(Platform::Facebook).await;

    let ids = p.orchestrator.generate(&campaign.id, 1).await.unwrap();
    p.run_media_stages(1).await;

    let later = PlatformSchedule {
        platform: Platform::Facebook,
        social_connection_id: None,
        scheduled_at: Utc::now() + chrono::Duration::hours(1),
    };
    p.orchestrator.schedule(&ids[0], vec![later]).await.unwrap();
    p.drain(Stage::SchedulePosts, 1).await;

    // not due yet, nothing to reserve
    assert!(p.drain(Stage::PostVideo, 1).await.is_empty());
    let counts = p.queue.counts(Stage::PostVideo).await.unwrap();
    assert_eq!(counts.delayed, 1);

    let task = p.store.post_tasks_for(&ids[0]).await.unwrap().remove(0);
    assert_eq!(task.status, PostStatus::Scheduled);
}

#[tokio::test]
async fn test_disabled_provider_fails_render() {
    let mut p = Pipeline::new();
    p.ctx.settings.render_provider = "sora".to_string();
    let campaign = p.campaign("fitness").await;

    let ids = p.orchestrator.generate(&campaign.id, 1).await.unwrap();
    for stage in [Stage::GenerateScript, Stage::SynthVoiceover, Stage::BuildCaptions] {
        p.drain(stage, 1).await;
    }

    let job = p
        .queue
        .reserve(Stage::RenderVideo, "e2e", 1)
        .await
        .unwrap()
        .remove(0);
    let (_tx, rx) = watch::channel(false);
    let err = dispatch(&p.ctx, &job.payload, rx).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("ENABLE_SORA"));

    let item = p.item(&ids[0]).await;
    assert_eq!(item.status, MediaStatus::Failed);
    assert_eq!(item.failed_stage, Some(Stage::RenderVideo));
}

#[tokio::test]
async fn test_executor_runs_batch_to_ready() {
    let p = Pipeline::new();
    let campaign = p.campaign("fitness").await;
    let ids = p.orchestrator.generate(&campaign.id, 3).await.unwrap();

    let config = WorkerConfig {
        idle_poll: Duration::from_millis(5),
        shutdown_timeout: Duration::from_secs(2),
        ..WorkerConfig::default()
    };
    let executor = Arc::new(JobExecutor::new(config, p.ctx.clone()));
    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let mut ready = 0;
        for id in &ids {
            if p.item(id).await.status == MediaStatus::Ready {
                ready += 1;
            }
        }
        if ready == ids.len() {
            break;
        }
        assert!(Instant::now() < deadline, "only {} of {} items ready", ready, ids.len());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    executor.shutdown();
    let joined = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap();
    tokio_test::assert_ok!(joined.unwrap());

    for stage in Stage::ALL {
        let counts = p.queue.counts(stage).await.unwrap();
        assert_eq!(counts.failed, 0, "{} has failed jobs", stage.as_str());
    }
}
