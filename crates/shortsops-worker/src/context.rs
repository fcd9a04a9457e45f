//! Dependencies shared by every stage handler.

use std::sync::Arc;

use shortsops_providers::{CredentialCipher, RendererRegistry, SocialPoster, TextToSpeech};
use shortsops_queue::JobQueue;
use shortsops_storage::ObjectStorage;
use shortsops_store::PipelineStore;

use crate::config::PipelineSettings;

/// Everything a handler talks to, injected at construction.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn PipelineStore>,
    pub queue: Arc<dyn JobQueue>,
    pub storage: Arc<dyn ObjectStorage>,
    pub tts: Arc<dyn TextToSpeech>,
    pub renderers: RendererRegistry,
    pub poster: Arc<dyn SocialPoster>,
    pub cipher: CredentialCipher,
    pub settings: PipelineSettings,
}
