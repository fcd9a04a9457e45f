//! External capabilities used by the pipeline.
//!
//! This crate provides:
//! - Capability traits: [`TextToSpeech`], [`VideoRenderer`], [`SocialPoster`]
//! - An FFmpeg renderer with an in-process [`RenderJobTracker`]
//! - Hosted renderer adapters and a [`RendererRegistry`]
//! - Mock and ElevenLabs speech synthesis
//! - Credential sealing for stored platform tokens

pub mod credentials;
pub mod error;
pub mod ffmpeg;
pub mod hosted;
pub mod metrics;
pub mod poster;
pub mod registry;
pub mod tracker;
pub mod traits;
pub mod tts;

pub use credentials::CredentialCipher;
pub use error::{ProviderError, ProviderResult};
pub use ffmpeg::{FfmpegRenderer, FfmpegRendererConfig, RENDER_DURATION_SECS};
pub use hosted::{HostedProvider, HostedRenderer};
pub use poster::MockSocialPoster;
pub use registry::RendererRegistry;
pub use tracker::{RenderJob, RenderJobTracker};
pub use traits::{
    PostReceipt, PostRequest, RenderRequest, RenderState, RenderStatus, SocialPoster,
    SynthesisOutput, SynthesisRequest, TextToSpeech, VideoRenderer,
};
pub use tts::{ElevenLabsConfig, ElevenLabsTts, MockTts};
