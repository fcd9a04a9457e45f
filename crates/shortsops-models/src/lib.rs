//! Shared data models for the ShortsOps pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media items and their status state machine
//! - Post tasks and platforms
//! - Typed script, asset and render records
//! - Campaigns, social connections and credential bundles
//! - Target video specifications

pub mod account;
pub mod assets;
pub mod ids;
pub mod media;
pub mod post;
pub mod render;
pub mod script;
pub mod stage;

// Re-export common types
pub use account::{Campaign, SocialConnection, TokenBundle};
pub use assets::{AssetBundle, AssetKind};
pub use ids::{
    AccountId, CampaignId, JobId, MediaItemId, PostTaskId, RenderJobId, SocialConnectionId,
};
pub use media::{MediaItem, MediaStatus, TransitionError};
pub use post::{Platform, PostResult, PostStatus, PostTask, PostTransitionError};
pub use render::{
    OverlayKind, OverlayPosition, OverlaySize, OverlaySpec, PlatformLimits, RenderResult,
    VideoTarget,
};
pub use script::ScriptParts;
pub use stage::Stage;
