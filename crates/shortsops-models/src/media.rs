//! Media item and its status state machine.
//!
//! ```text
//! PENDING ──▶ RENDERING ──▶ READY
//!    │            │
//!    └────▶ FAILED ◀┘
//! ```
//!
//! READY is terminal. FAILED is sticky: only a re-run of the stage recorded
//! in `failed_stage` may move the item forward again.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::assets::AssetBundle;
use crate::ids::{AccountId, CampaignId, MediaItemId};
use crate::render::RenderResult;
use crate::script::ScriptParts;
use crate::stage::Stage;

/// Lifecycle status of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    /// Created, pre-render stages in progress
    #[default]
    Pending,
    /// Render requested and being polled
    Rendering,
    /// Rendered video available
    Ready,
    /// A stage failed; see `failed_stage`
    Failed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "PENDING",
            MediaStatus::Rendering => "RENDERING",
            MediaStatus::Ready => "READY",
            MediaStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaStatus::Ready)
    }

    /// Whether the edge `self -> next` exists in the state machine.
    ///
    /// Edges out of FAILED are retries and are further restricted by
    /// [`MediaItem`] to the stage that failed.
    pub fn can_transition_to(&self, next: MediaStatus) -> bool {
        use MediaStatus::*;
        matches!(
            (self, next),
            (Pending, Rendering)
                | (Pending, Failed)
                | (Rendering, Rendering)
                | (Rendering, Ready)
                | (Rendering, Failed)
                | (Failed, Pending)
                | (Failed, Rendering)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected media item mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid status transition {from} -> {to}")]
    Invalid { from: MediaStatus, to: MediaStatus },

    #[error("media item is already READY")]
    AlreadyReady,

    #[error("media item FAILED at stage {}", .failed_stage.map(|s| s.as_str()).unwrap_or("unknown"))]
    StickyFailure { failed_stage: Option<Stage> },
}

/// A single short video moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: MediaItemId,

    /// Owning account; social connections are looked up through it
    pub account_id: AccountId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<CampaignId>,

    /// Language of the script and voiceover
    pub locale: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptParts>,

    #[serde(default)]
    pub assets: AssetBundle,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderResult>,

    /// Estimated duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u32>,

    #[serde(default)]
    pub status: MediaStatus,

    /// Human-readable failure text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaItem {
    /// Create a new PENDING item.
    pub fn new(account_id: AccountId, campaign_id: Option<CampaignId>, locale: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MediaItemId::new(),
            account_id,
            campaign_id,
            locale: locale.into(),
            script: None,
            assets: AssetBundle::default(),
            render: None,
            duration_sec: None,
            status: MediaStatus::Pending,
            error: None,
            failed_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether `stage` may run against this item.
    ///
    /// Scheduling and posting only read the item and are always admitted.
    pub fn admits(&self, stage: Stage) -> Result<(), TransitionError> {
        if !stage.drives_media_status() {
            return Ok(());
        }
        match self.status {
            MediaStatus::Ready => Err(TransitionError::AlreadyReady),
            MediaStatus::Failed if self.failed_stage != Some(stage) => {
                Err(TransitionError::StickyFailure {
                    failed_stage: self.failed_stage,
                })
            }
            _ => Ok(()),
        }
    }

    /// Write the script produced by the script stage.
    pub fn set_script(&mut self, script: ScriptParts) -> Result<(), TransitionError> {
        self.revive_for(Stage::GenerateScript)?;
        self.script = Some(script);
        self.touch();
        Ok(())
    }

    /// Additively merge assets produced by `stage`. Returns true if changed.
    pub fn merge_assets(&mut self, stage: Stage, update: &AssetBundle) -> Result<bool, TransitionError> {
        self.revive_for(stage)?;
        let changed = self.assets.merge(update);
        self.touch();
        Ok(changed)
    }

    /// Enter RENDERING. Re-entering from RENDERING is a redelivery.
    pub fn start_render(&mut self) -> Result<(), TransitionError> {
        self.admits(Stage::RenderVideo)?;
        self.transition(MediaStatus::Rendering)?;
        self.error = None;
        self.failed_stage = None;
        Ok(())
    }

    /// Record a successful render and move to READY.
    pub fn complete_render(&mut self, render: RenderResult, duration_sec: u32) -> Result<(), TransitionError> {
        if self.status != MediaStatus::Rendering {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: MediaStatus::Ready,
            });
        }
        self.render = Some(render);
        self.duration_sec = Some(duration_sec);
        self.transition(MediaStatus::Ready)
    }

    /// Mark the item FAILED at `stage` with the given error text.
    pub fn fail(&mut self, stage: Stage, error: impl Into<String>) -> Result<(), TransitionError> {
        if self.status == MediaStatus::Ready {
            return Err(TransitionError::AlreadyReady);
        }
        self.transition(MediaStatus::Failed)?;
        self.error = Some(error.into());
        self.failed_stage = Some(stage);
        Ok(())
    }

    fn revive_for(&mut self, stage: Stage) -> Result<(), TransitionError> {
        self.admits(stage)?;
        if self.status == MediaStatus::Failed {
            self.transition(MediaStatus::Pending)?;
            self.error = None;
            self.failed_stage = None;
        }
        Ok(())
    }

    fn transition(&mut self, next: MediaStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
