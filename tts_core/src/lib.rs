mod codec;

pub use codec::{decode_audio_base64, encode_audio_base64};

use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("text-to-speech request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("text-to-speech API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl TtsError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TtsError::Request(e) => e.status(),
            TtsError::Status { status, .. } => Some(*status),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.8,
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Speaks text with a fixed ElevenLabs voice. Output is MP3.
#[derive(Clone)]
pub struct Synthesizer {
    client: Client,
    api_key: String,
    voice_id: String,
    base_url: String,
    model: String,
    settings: VoiceSettings,
}

impl Synthesizer {
    pub fn new(client: Client, api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            settings: VoiceSettings::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    fn endpoint(&self) -> String {
        format!("{}/text-to-speech/{}", self.base_url, self.voice_id)
    }

    /// Synthesize `text` and return the audio bytes.
    ///
    /// Only `200 OK` counts as success; any other status is returned as
    /// [`TtsError::Status`] with the upstream body for logging.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let request = SpeechRequest {
            text,
            model_id: &self.model,
            voice_settings: self.settings,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status { status, body });
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), voice = %self.voice_id, "speech synthesized");
        Ok(audio.to_vec())
    }
}
