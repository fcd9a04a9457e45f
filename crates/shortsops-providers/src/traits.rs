//! Capability contracts the pipeline talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortsops_models::{
    OverlaySpec, Platform, RenderJobId, ScriptParts, TokenBundle, VideoTarget,
};

use crate::error::ProviderResult;

/// Speech synthesis request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub lang: String,
    /// Treat `text` as SSML markup
    pub ssml: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutput {
    pub audio_url: String,
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> ProviderResult<SynthesisOutput>;
}

/// Everything a renderer needs to produce one video.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub script: ScriptParts,
    pub tts_url: String,
    /// SRT document, not a URL
    pub captions_srt: String,
    pub target: VideoTarget,
    pub overlays: Vec<OverlaySpec>,
    /// Storage URL of the watermark image
    pub watermark: Option<String>,
}

/// Lifecycle of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderState::Succeeded | RenderState::Failed)
    }

    pub fn can_transition_to(&self, next: RenderState) -> bool {
        matches!(
            (self, next),
            (RenderState::Queued, RenderState::Running)
                | (RenderState::Queued, RenderState::Failed)
                | (RenderState::Running, RenderState::Succeeded)
                | (RenderState::Running, RenderState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Queued => "QUEUED",
            RenderState::Running => "RUNNING",
            RenderState::Succeeded => "SUCCEEDED",
            RenderState::Failed => "FAILED",
        }
    }
}

/// Snapshot returned by [`VideoRenderer::get_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderStatus {
    pub state: RenderState,
    pub output_url: Option<String>,
    pub error: Option<String>,
}

impl RenderStatus {
    pub fn succeeded(output_url: impl Into<String>) -> Self {
        Self {
            state: RenderState::Succeeded,
            output_url: Some(output_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: RenderState::Failed,
            output_url: None,
            error: Some(error.into()),
        }
    }

    pub fn pending(state: RenderState) -> Self {
        Self {
            state,
            output_url: None,
            error: None,
        }
    }
}

#[async_trait]
pub trait VideoRenderer: Send + Sync {
    /// Start a render and return its job id without waiting for the output.
    async fn create_render(&self, request: RenderRequest) -> ProviderResult<RenderJobId>;

    /// Current status of `job_id`. Fails with `JobNotFound` for unknown ids.
    async fn get_status(&self, job_id: &RenderJobId) -> ProviderResult<RenderStatus>;
}

/// Upload of one rendered short to a platform.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub platform: Platform,
    pub tokens: TokenBundle,
    pub video_url: String,
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub publish_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReceipt {
    pub external_id: String,
    pub publish_url: Option<String>,
}

#[async_trait]
pub trait SocialPoster: Send + Sync {
    async fn post_short(&self, request: &PostRequest) -> ProviderResult<PostReceipt>;
}
