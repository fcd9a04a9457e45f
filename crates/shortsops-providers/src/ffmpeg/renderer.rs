//! Local renderer: solid background, burned-in captions, normalized voiceover.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use shortsops_models::{OverlaySize, OverlaySpec, RenderJobId, VideoTarget};
use shortsops_storage::{ObjectStorage, RENDER_URL_TTL};
use tracing::{error, info, warn};

use super::command::{FfmpegCommand, FfmpegRunner};
use crate::error::ProviderResult;
use crate::metrics::{record_call, record_render};
use crate::tracker::RenderJobTracker;
use crate::traits::{RenderRequest, RenderStatus, VideoRenderer};

const PROVIDER: &str = "ffmpeg";

/// Length of every rendered video in seconds.
pub const RENDER_DURATION_SECS: u32 = 10;

const BACKGROUND_COLOR: &str = "0x1a1a1a";

const SUBTITLE_STYLE: &str = "Fontsize=24,PrimaryColour=&H00FFFFFF,OutlineColour=&H00000000,\
BorderStyle=3,Outline=2,Shadow=0,MarginV=50,Alignment=2";

const LOUDNORM: &str = "loudnorm=I=-14:LRA=11:TP=-1.5";

/// Inset of the watermark from the bottom-right corner.
const WATERMARK_MARGIN: u32 = 24;

const TEXT_STYLE: &str = "fontsize=48:fontcolor=white:borderw=2:bordercolor=black";

/// One composited layer with its image already on local disk.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayLayer {
    Image {
        path: PathBuf,
        /// Overlay filter position expressions
        x: String,
        y: String,
        size: Option<OverlaySize>,
    },
    Text { text: String, x: u32, y: u32 },
}

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct FfmpegRendererConfig {
    /// Parent of the per-job temporary directories
    pub work_dir: PathBuf,
    /// Kill FFmpeg after this many seconds
    pub timeout_secs: u64,
}

impl Default for FfmpegRendererConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("shortsops"),
            timeout_secs: 600,
        }
    }
}

/// Renders with a local FFmpeg binary on a background task.
#[derive(Clone)]
pub struct FfmpegRenderer {
    tracker: Arc<RenderJobTracker>,
    storage: Arc<dyn ObjectStorage>,
    config: FfmpegRendererConfig,
}

impl FfmpegRenderer {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: FfmpegRendererConfig) -> Self {
        Self {
            tracker: Arc::new(RenderJobTracker::new()),
            storage,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<RenderJobTracker> {
        &self.tracker
    }

    async fn run_job(&self, job_id: &RenderJobId, request: RenderRequest) -> ProviderResult<String> {
        self.tracker.mark_running(job_id).await?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        // dropped on every return path, which removes the directory
        let dir = tempfile::Builder::new()
            .prefix("render-")
            .tempdir_in(&self.config.work_dir)?;

        let audio_key = self.storage.key_from_url(&request.tts_url)?;
        let audio = self.storage.download(&audio_key).await?;
        let audio_path = dir.path().join("audio.mp3");
        tokio::fs::write(&audio_path, audio).await?;

        let captions_path = dir.path().join("captions.srt");
        tokio::fs::write(&captions_path, &request.captions_srt).await?;

        let layers = self.fetch_layers(dir.path(), &request).await?;

        let output_path = dir.path().join("output.mp4");
        let cmd = compose_command(
            &audio_path,
            &captions_path,
            &output_path,
            &request.target,
            &layers,
        );
        FfmpegRunner::new()
            .with_timeout(self.config.timeout_secs)
            .run(&cmd)
            .await?;

        let data = tokio::fs::read(&output_path).await?;
        let key = format!("renders/{}/output.mp4", job_id);
        self.storage.upload(&key, data, "video/mp4").await?;
        let url = self.storage.signed_download_url(&key, RENDER_URL_TTL).await?;
        Ok(url)
    }

    /// Download overlay images into `dir`. The watermark goes last so it is
    /// drawn on top.
    async fn fetch_layers(
        &self,
        dir: &Path,
        request: &RenderRequest,
    ) -> ProviderResult<Vec<OverlayLayer>> {
        let mut layers = Vec::with_capacity(request.overlays.len() + 1);
        for (i, overlay) in request.overlays.iter().enumerate() {
            match overlay {
                OverlaySpec { url: Some(url), .. } => {
                    let path = self.fetch_image(dir, &format!("overlay-{}", i), url).await?;
                    layers.push(OverlayLayer::Image {
                        path,
                        x: overlay.position.x.to_string(),
                        y: overlay.position.y.to_string(),
                        size: overlay.size,
                    });
                }
                OverlaySpec { text: Some(text), .. } => layers.push(OverlayLayer::Text {
                    text: text.clone(),
                    x: overlay.position.x,
                    y: overlay.position.y,
                }),
                _ => warn!(kind = ?overlay.kind, "Skipping overlay without url or text"),
            }
        }
        if let Some(url) = &request.watermark {
            let path = self.fetch_image(dir, "watermark", url).await?;
            layers.push(OverlayLayer::Image {
                path,
                x: format!("W-w-{}", WATERMARK_MARGIN),
                y: format!("H-h-{}", WATERMARK_MARGIN),
                size: None,
            });
        }
        Ok(layers)
    }

    async fn fetch_image(&self, dir: &Path, stem: &str, url: &str) -> ProviderResult<PathBuf> {
        let key = self.storage.key_from_url(url)?;
        let data = self.storage.download(&key).await?;
        let ext = Path::new(&key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let path = dir.join(format!("{}.{}", stem, ext));
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}

#[async_trait]
impl VideoRenderer for FfmpegRenderer {
    async fn create_render(&self, request: RenderRequest) -> ProviderResult<RenderJobId> {
        let job_id = RenderJobId::new();
        self.tracker.register(job_id.clone()).await;
        record_call(PROVIDER, "create_render", true);
        info!(job_id = %job_id, "Render queued");

        let this = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            match this.run_job(&id, request).await {
                Ok(url) => {
                    record_render(PROVIDER, true, started.elapsed().as_secs_f64());
                    info!(job_id = %id, "Render finished");
                    if let Err(e) = this.tracker.succeed(&id, url).await {
                        error!(job_id = %id, "Failed to record render success: {}", e);
                    }
                }
                Err(e) => {
                    record_render(PROVIDER, false, started.elapsed().as_secs_f64());
                    error!(job_id = %id, "Render failed: {}", e);
                    if let Err(e) = this.tracker.fail(&id, e.to_string()).await {
                        error!(job_id = %id, "Failed to record render failure: {}", e);
                    }
                }
            }
        });

        Ok(job_id)
    }

    async fn get_status(&self, job_id: &RenderJobId) -> ProviderResult<RenderStatus> {
        self.tracker.status(job_id).await
    }
}

/// Escape a path for use inside a quoted filtergraph option.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Escape free text for a drawtext option.
fn escape_filter_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

/// One-pass render: lavfi background + voiceover, subtitles burned in, then
/// `layers` composited in order.
pub fn compose_command(
    audio: &Path,
    captions: &Path,
    output: &Path,
    target: &VideoTarget,
    layers: &[OverlayLayer],
) -> FfmpegCommand {
    let background = format!(
        "color=c={}:s={}:d={}:r={}",
        BACKGROUND_COLOR,
        target.size(),
        RENDER_DURATION_SECS,
        target.fps
    );
    let mut cmd = FfmpegCommand::new(output).lavfi_input(background).input(audio);
    let mut chains = vec![format!(
        "[0:v]subtitles=filename='{}':force_style='{}'[v0]",
        escape_filter_path(captions),
        SUBTITLE_STYLE
    )];

    // inputs 0 and 1 are the background and the voiceover
    let mut next_input = 2;
    for (i, layer) in layers.iter().enumerate() {
        let (from, to) = (format!("[v{}]", i), format!("[v{}]", i + 1));
        match layer {
            OverlayLayer::Image { path, x, y, size } => {
                cmd = cmd.input(path);
                let image = match size {
                    Some(size) => {
                        chains.push(format!(
                            "[{}:v]scale={}:{}[ov{}]",
                            next_input, size.width, size.height, i
                        ));
                        format!("[ov{}]", i)
                    }
                    None => format!("[{}:v]", next_input),
                };
                chains.push(format!("{}{}overlay={}:{}{}", from, image, x, y, to));
                next_input += 1;
            }
            OverlayLayer::Text { text, x, y } => chains.push(format!(
                "{}drawtext=text='{}':x={}:y={}:{}{}",
                from,
                escape_filter_text(text),
                x,
                y,
                TEXT_STYLE,
                to
            )),
        }
    }
    chains.push(format!("[1:a]{}[a]", LOUDNORM));
    let video = format!("[v{}]", layers.len());

    cmd.filter_complex(chains.join(";"))
        .map(video)
        .map("[a]")
        .video_codec("libx264")
        .preset("medium")
        .crf(23)
        .output_args([
            "-b:v".to_string(),
            target.bitrate.to_string(),
            "-maxrate".to_string(),
            target.bitrate.to_string(),
            "-bufsize".to_string(),
            (target.bitrate * 2).to_string(),
            "-r".to_string(),
            target.fps.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ])
        .audio_codec("aac")
        .audio_bitrate("128k")
        .output_args(["-ar", "44100", "-movflags", "+faststart"])
        .duration(RENDER_DURATION_SECS)
}
