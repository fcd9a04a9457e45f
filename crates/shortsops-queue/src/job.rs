//! Job payloads for the six pipeline queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortsops_models::{
    MediaItemId, OverlaySpec, Platform, PostTaskId, ScriptParts, SocialConnectionId, Stage,
};

/// Write a script for a fresh media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateScriptJob {
    pub media_item_id: MediaItemId,
    pub niche: String,
    pub lang: String,
    /// Seed hook overriding the template hook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

impl GenerateScriptJob {
    pub fn new(media_item_id: MediaItemId, niche: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            media_item_id,
            niche: niche.into(),
            lang: lang.into(),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Option<String>) -> Self {
        self.hook = hook;
        self
    }
}

/// Synthesize the voiceover for a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthVoiceoverJob {
    pub media_item_id: MediaItemId,
    pub script: ScriptParts,
    pub voice: String,
    pub lang: String,
}

/// Build the caption track for a voiceover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCaptionsJob {
    pub media_item_id: MediaItemId,
    pub audio_url: String,
    /// Full spoken text
    pub script: String,
}

/// Render the final video with the selected provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoJob {
    pub media_item_id: MediaItemId,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<OverlaySpec>,
    /// Storage URL of an image stamped in the bottom-right corner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
}

impl RenderVideoJob {
    pub fn new(media_item_id: MediaItemId, provider: impl Into<String>) -> Self {
        Self {
            media_item_id,
            provider: provider.into(),
            overlays: Vec::new(),
            watermark: None,
        }
    }
}

/// One platform entry of a scheduling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSchedule {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_connection_id: Option<SocialConnectionId>,
    pub scheduled_at: DateTime<Utc>,
}

/// Fan a ready media item out to platform post tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePostsJob {
    pub media_item_id: MediaItemId,
    /// Identifies the scheduling request; post task ids derive from it
    pub request_id: String,
    pub platforms: Vec<PlatformSchedule>,
}

/// Publish one post task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostVideoJob {
    pub post_task_id: PostTaskId,
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    GenerateScript(GenerateScriptJob),
    SynthVoiceover(SynthVoiceoverJob),
    BuildCaptions(BuildCaptionsJob),
    RenderVideo(RenderVideoJob),
    SchedulePosts(SchedulePostsJob),
    PostVideo(PostVideoJob),
}

impl QueueJob {
    /// Queue this payload belongs on.
    pub fn stage(&self) -> Stage {
        match self {
            QueueJob::GenerateScript(_) => Stage::GenerateScript,
            QueueJob::SynthVoiceover(_) => Stage::SynthVoiceover,
            QueueJob::BuildCaptions(_) => Stage::BuildCaptions,
            QueueJob::RenderVideo(_) => Stage::RenderVideo,
            QueueJob::SchedulePosts(_) => Stage::SchedulePosts,
            QueueJob::PostVideo(_) => Stage::PostVideo,
        }
    }

    /// Media item the job acts on; post jobs only know their task.
    pub fn media_item_id(&self) -> Option<&MediaItemId> {
        match self {
            QueueJob::GenerateScript(j) => Some(&j.media_item_id),
            QueueJob::SynthVoiceover(j) => Some(&j.media_item_id),
            QueueJob::BuildCaptions(j) => Some(&j.media_item_id),
            QueueJob::RenderVideo(j) => Some(&j.media_item_id),
            QueueJob::SchedulePosts(j) => Some(&j.media_item_id),
            QueueJob::PostVideo(_) => None,
        }
    }

    /// Id of the entity the job targets, for logging.
    pub fn subject(&self) -> &str {
        match self {
            QueueJob::PostVideo(j) => j.post_task_id.as_str(),
            other => other.media_item_id().map(|id| id.as_str()).unwrap_or_default(),
        }
    }
}
