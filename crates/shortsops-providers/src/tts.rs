//! Speech synthesis providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shortsops_storage::ObjectStorage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::record_call;
use crate::traits::{SynthesisOutput, SynthesisRequest, TextToSpeech};

const MP3_CONTENT_TYPE: &str = "audio/mpeg";

/// MPEG-1 Layer III frame sync and header.
const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
const MP3_FRAMES_PER_SEC: f64 = 38.28;
const MP3_FRAME_BYTES: usize = 417;

/// Estimated speech length for `chars` characters of text, clamped to 3..=60 s.
pub fn estimated_duration_secs(chars: usize) -> f64 {
    (chars as f64 / 15.0).clamp(3.0, 60.0)
}

/// Silent MP3 payload sized for `chars` characters of speech.
pub fn silent_mp3(chars: usize) -> Vec<u8> {
    let frames = (estimated_duration_secs(chars) * MP3_FRAMES_PER_SEC).floor() as usize;
    let mut data = Vec::with_capacity(MP3_HEADER.len() + frames * MP3_FRAME_BYTES);
    data.extend_from_slice(&MP3_HEADER);
    data.resize(MP3_HEADER.len() + frames * MP3_FRAME_BYTES, 0);
    data
}

fn audio_key() -> String {
    format!("tts/{}.mp3", Uuid::new_v4())
}

/// Uploads silent audio whose length follows the text length.
pub struct MockTts {
    storage: Arc<dyn ObjectStorage>,
}

impl MockTts {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, request: &SynthesisRequest) -> ProviderResult<SynthesisOutput> {
        info!(
            voice = %request.voice,
            lang = %request.lang,
            chars = request.text.len(),
            "Synthesizing mock voiceover"
        );

        let audio = silent_mp3(request.text.len());
        let audio_url = self
            .storage
            .upload(&audio_key(), audio, MP3_CONTENT_TYPE)
            .await?;
        record_call("mock-tts", "synthesize", true);
        Ok(SynthesisOutput { audio_url })
    }
}

/// ElevenLabs client settings.
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_id: String,
    /// Voice used when a job asks for `default`
    pub default_voice_id: String,
    pub timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            default_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ElevenLabsConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<&'a str>,
}

/// ElevenLabs text-to-speech. Without an API key it falls back to [`MockTts`].
pub struct ElevenLabsTts {
    config: ElevenLabsConfig,
    client: Client,
    storage: Arc<dyn ObjectStorage>,
    fallback: MockTts,
}

impl ElevenLabsTts {
    pub fn new(config: ElevenLabsConfig, storage: Arc<dyn ObjectStorage>) -> ProviderResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            client,
            fallback: MockTts::new(Arc::clone(&storage)),
            storage,
        })
    }

    fn voice_id<'a>(&'a self, voice: &'a str) -> &'a str {
        if voice.is_empty() || voice.eq_ignore_ascii_case("default") {
            &self.config.default_voice_id
        } else {
            voice
        }
    }

    async fn request_speech(&self, api_key: &str, request: &SynthesisRequest) -> ProviderResult<Vec<u8>> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.voice_id(&request.voice)
        );
        let body = SpeechRequest {
            text: &request.text,
            model_id: &self.config.model_id,
            language_code: Some(request.lang.as_str()).filter(|l| !l.is_empty()),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, MP3_CONTENT_TYPE)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: "elevenlabs",
                status,
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn synthesize(&self, request: &SynthesisRequest) -> ProviderResult<SynthesisOutput> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            warn!("ElevenLabs API key not set, falling back to mock");
            return self.fallback.synthesize(request).await;
        };

        info!(voice = %request.voice, lang = %request.lang, "Synthesizing voiceover with ElevenLabs");
        let audio = match self.request_speech(api_key, request).await {
            Ok(audio) => audio,
            Err(e) => {
                record_call("elevenlabs", "synthesize", false);
                return Err(e);
            }
        };

        let audio_url = self
            .storage
            .upload(&audio_key(), audio, MP3_CONTENT_TYPE)
            .await?;
        record_call("elevenlabs", "synthesize", true);
        Ok(SynthesisOutput { audio_url })
    }
}
