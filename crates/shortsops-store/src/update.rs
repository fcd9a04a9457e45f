//! Partial updates applied against the freshly read record.

use std::time::Duration;

use shortsops_models::{
    AssetBundle, MediaItem, PostTask, PostTransitionError, RenderResult, ScriptParts, Stage,
    TransitionError,
};

/// A single mutation of a media item.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaItemUpdate {
    Script(ScriptParts),
    MergeAssets { stage: Stage, assets: AssetBundle },
    StartRender,
    CompleteRender { render: RenderResult, duration_sec: u32 },
    Fail { stage: Stage, error: String },
}

impl MediaItemUpdate {
    pub fn fail(stage: Stage, error: impl Into<String>) -> Self {
        Self::Fail {
            stage,
            error: error.into(),
        }
    }

    pub fn apply(&self, item: &mut MediaItem) -> Result<(), TransitionError> {
        match self {
            MediaItemUpdate::Script(script) => item.set_script(script.clone()),
            MediaItemUpdate::MergeAssets { stage, assets } => {
                item.merge_assets(*stage, assets).map(|_| ())
            }
            MediaItemUpdate::StartRender => item.start_render(),
            MediaItemUpdate::CompleteRender {
                render,
                duration_sec,
            } => item.complete_render(render.clone(), *duration_sec),
            MediaItemUpdate::Fail { stage, error } => item.fail(*stage, error.clone()),
        }
    }
}

/// A single mutation of a post task.
#[derive(Debug, Clone, PartialEq)]
pub enum PostTaskUpdate {
    /// Claim the task for an attempt; a live POSTING attempt younger than
    /// `lease` rejects the claim.
    StartPosting { lease: Duration },
    Posted {
        external_id: String,
        publish_url: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl PostTaskUpdate {
    pub fn apply(&self, task: &mut PostTask) -> Result<(), PostTransitionError> {
        match self {
            PostTaskUpdate::StartPosting { lease } => task.start_posting(*lease),
            PostTaskUpdate::Posted {
                external_id,
                publish_url,
            } => task.mark_posted(external_id.clone(), publish_url.clone()),
            PostTaskUpdate::Failed { error } => task.mark_failed(error.clone()),
        }
    }
}
