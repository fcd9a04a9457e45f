//! Pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shortsops_providers::{
    CredentialCipher, ElevenLabsConfig, ElevenLabsTts, FfmpegRenderer, FfmpegRendererConfig,
    HostedRenderer, MockSocialPoster, RendererRegistry,
};
use shortsops_queue::RedisJobQueue;
use shortsops_storage::{ObjectStorage, S3Storage};
use shortsops_store::RedisStore;
use shortsops_worker::{metrics, JobExecutor, PipelineContext, WorkerConfig};

fn exit_with(what: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", what, err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting shortsops-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::install_exporter(addr) {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => exit_with("Failed to install metrics exporter", e),
        }
    }

    let queue = RedisJobQueue::from_env().unwrap_or_else(|e| exit_with("Failed to create job queue", e));
    if let Err(e) = queue.init().await {
        exit_with("Failed to initialize job queue", e);
    }
    let store = RedisStore::from_env().unwrap_or_else(|e| exit_with("Failed to create store", e));
    let storage: Arc<dyn ObjectStorage> = Arc::new(
        S3Storage::from_env().unwrap_or_else(|e| exit_with("Failed to create object storage", e)),
    );
    let tts = ElevenLabsTts::new(ElevenLabsConfig::from_env(), Arc::clone(&storage))
        .unwrap_or_else(|e| exit_with("Failed to create TTS client", e));

    let ffmpeg = FfmpegRenderer::new(
        Arc::clone(&storage),
        FfmpegRendererConfig {
            work_dir: config.work_dir.clone().into(),
            timeout_secs: config.ffmpeg_timeout.as_secs(),
        },
    );
    let renderers = RendererRegistry::new()
        .with("ffmpeg", Arc::new(ffmpeg))
        .with("invideo", Arc::new(HostedRenderer::invideo()))
        .with("sora", Arc::new(HostedRenderer::sora(config.enable_sora)));
    info!(renderers = ?renderers.names(), "Render providers registered");

    let ctx = PipelineContext {
        store: Arc::new(store),
        queue: Arc::new(queue),
        storage,
        tts: Arc::new(tts),
        renderers,
        poster: Arc::new(MockSocialPoster::default()),
        cipher: CredentialCipher::from_env(),
        settings: config.pipeline.clone(),
    };

    let executor = Arc::new(JobExecutor::new(config, ctx));

    // Setup signal handler
    let signal = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal.shutdown();
    });

    if let Err(e) = executor.run().await {
        exit_with("Executor error", e);
    }

    info!("Worker shutdown complete");
}
