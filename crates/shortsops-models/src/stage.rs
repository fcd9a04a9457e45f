//! Pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One discrete unit of pipeline work.
///
/// Each stage is serviced by its own named queue; the queue name is the
/// stage's kebab-case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    GenerateScript,
    SynthVoiceover,
    BuildCaptions,
    RenderVideo,
    SchedulePosts,
    PostVideo,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::GenerateScript,
        Stage::SynthVoiceover,
        Stage::BuildCaptions,
        Stage::RenderVideo,
        Stage::SchedulePosts,
        Stage::PostVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GenerateScript => "generate-script",
            Stage::SynthVoiceover => "synth-voiceover",
            Stage::BuildCaptions => "build-captions",
            Stage::RenderVideo => "render-video",
            Stage::SchedulePosts => "schedule-posts",
            Stage::PostVideo => "post-video",
        }
    }

    /// Parse a queue/stage name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == s)
    }

    /// Stages that advance the media item's own status.
    ///
    /// Scheduling and posting operate on post tasks and never touch the
    /// media item's status.
    pub fn drives_media_status(&self) -> bool {
        matches!(
            self,
            Stage::GenerateScript | Stage::SynthVoiceover | Stage::BuildCaptions | Stage::RenderVideo
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
