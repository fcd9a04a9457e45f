//! Media item asset bundle.
//!
//! Assets accumulate across stages. A later stage may replace the URL of an
//! asset it produces itself (re-delivery of the same stage), but nothing ever
//! removes a key written earlier.

use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of generated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum AssetKind {
    #[serde(rename = "ttsUrl")]
    TtsUrl,
    #[serde(rename = "srtUrl")]
    SrtUrl,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::TtsUrl => "ttsUrl",
            AssetKind::SrtUrl => "srtUrl",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Asset URLs produced by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetBundle {
    /// Voiceover audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_url: Option<String>,

    /// Caption track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_url: Option<String>,

    /// Bumped on every merge that changed the bundle
    #[serde(default)]
    pub version: u32,
}

impl AssetBundle {
    /// Bundle carrying only a voiceover URL.
    pub fn tts(url: impl Into<String>) -> Self {
        Self {
            tts_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Bundle carrying only a caption URL.
    pub fn srt(url: impl Into<String>) -> Self {
        Self {
            srt_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn get(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::TtsUrl => self.tts_url.as_deref(),
            AssetKind::SrtUrl => self.srt_url.as_deref(),
        }
    }

    /// Merge another bundle into this one.
    ///
    /// Keys present in `update` are written; keys absent from `update` are
    /// left untouched. Returns true if anything changed.
    pub fn merge(&mut self, update: &AssetBundle) -> bool {
        let mut changed = false;

        if let Some(url) = &update.tts_url {
            if self.tts_url.as_ref() != Some(url) {
                self.tts_url = Some(url.clone());
                changed = true;
            }
        }
        if let Some(url) = &update.srt_url {
            if self.srt_url.as_ref() != Some(url) {
                self.srt_url = Some(url.clone());
                changed = true;
            }
        }

        if changed {
            self.version += 1;
        }
        changed
    }

    /// Set of asset kinds currently present.
    pub fn keys(&self) -> BTreeSet<AssetKind> {
        [AssetKind::TtsUrl, AssetKind::SrtUrl]
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .collect()
    }

    /// Required kinds that are not present.
    pub fn missing(&self, required: &[AssetKind]) -> Vec<AssetKind> {
        required
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }
}
