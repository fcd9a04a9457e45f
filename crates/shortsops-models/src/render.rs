//! Render results and target video specifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::RenderJobId;
use crate::post::Platform;

/// Outcome of a completed render. Always written as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    /// Provider selector used for the render (e.g. "ffmpeg")
    pub provider: String,
    /// Provider-issued job id
    pub job_id: RenderJobId,
    /// Signed URL of the rendered video
    pub output_url: String,
}

/// Output geometry and bitrate for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoTarget {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Video bitrate in bits per second
    pub bitrate: u64,
}

impl VideoTarget {
    /// Vertical 9:16 short-form preset.
    pub const SHORTS: VideoTarget = VideoTarget {
        width: 1080,
        height: 1920,
        fps: 30,
        bitrate: 8_000_000,
    };

    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Default for VideoTarget {
    fn default() -> Self {
        Self::SHORTS
    }
}

/// What an overlay draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Watermark,
    Caption,
    Logo,
}

/// Top-left corner of an overlay in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct OverlayPosition {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OverlaySize {
    pub width: u32,
    pub height: u32,
}

/// An image or text layer composited over the rendered video.
///
/// Image layers (`url`) are scaled to `size` when given. Text layers
/// (`text`) are drawn at `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OverlaySpec {
    #[serde(rename = "type")]
    pub kind: OverlayKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub position: OverlayPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<OverlaySize>,
}

impl OverlaySpec {
    pub fn image(kind: OverlayKind, url: impl Into<String>, position: OverlayPosition) -> Self {
        Self {
            kind,
            url: Some(url.into()),
            text: None,
            position,
            size: None,
        }
    }

    pub fn text(text: impl Into<String>, position: OverlayPosition) -> Self {
        Self {
            kind: OverlayKind::Caption,
            url: None,
            text: Some(text.into()),
            position,
            size: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(OverlaySize { width, height });
        self
    }
}

/// Upload limits of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub max_duration_secs: u32,
    pub max_size_bytes: u64,
}

impl PlatformLimits {
    pub fn for_platform(platform: Platform) -> Self {
        const MB: u64 = 1024 * 1024;
        match platform {
            Platform::Youtube => Self {
                max_duration_secs: 60,
                max_size_bytes: 256 * MB,
            },
            Platform::Tiktok => Self {
                max_duration_secs: 60,
                max_size_bytes: 287 * MB,
            },
            Platform::Instagram => Self {
                max_duration_secs: 90,
                max_size_bytes: 100 * MB,
            },
            Platform::Facebook => Self {
                max_duration_secs: 60,
                max_size_bytes: 100 * MB,
            },
        }
    }

    pub fn allows_duration(&self, secs: u32) -> bool {
        secs <= self.max_duration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorts_preset_is_vertical() {
        let target = VideoTarget::SHORTS;
        assert!(target.height > target.width);
        assert_eq!(target.size(), "1080x1920");
    }

    #[test]
    fn overlay_uses_wire_names() {
        let overlay = OverlaySpec::image(
            OverlayKind::Logo,
            "s3://bucket/logo.png",
            OverlayPosition { x: 20, y: 40 },
        )
        .with_size(120, 120);
        let json = serde_json::to_value(&overlay).unwrap();
        assert_eq!(json["type"], "logo");
        assert_eq!(json["position"]["y"], 40);
        assert_eq!(json["size"]["width"], 120);
        assert!(json.get("text").is_none());

        let parsed: OverlaySpec =
            serde_json::from_str(r#"{"type":"caption","text":"hi"}"#).unwrap();
        assert_eq!(parsed, OverlaySpec::text("hi", OverlayPosition::default()));
    }

    #[test]
    fn instagram_allows_longer_clips() {
        assert!(PlatformLimits::for_platform(Platform::Instagram).allows_duration(75));
        assert!(!PlatformLimits::for_platform(Platform::Tiktok).allows_duration(75));
    }
}
