use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

/// Default OpenAI API root; `/audio/transcriptions` is appended to it.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "whisper-1";
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum SttError {
    #[error("speech-to-text request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("speech-to-text API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed speech-to-text response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SttError {
    /// Upstream status code, when the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SttError::Request(e) => e.status(),
            SttError::Status { status, .. } => Some(*status),
            SttError::Decode(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Structure for the Whisper transcription response.
/// Whisper omits `text` when it hears nothing, so it defaults to empty.
#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Converts WAV audio to text through the OpenAI Whisper API
#[derive(Clone)]
pub struct Transcriber {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    language: String,
}

impl Transcriber {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Point the client at another API root (a proxy or a local fake)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Upload `audio` as `audio.wav` and return the transcript.
    ///
    /// A successful response without a `text` field yields an empty string.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, SttError> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let file = multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::Status { status, body });
        }

        let body = response.text().await?;
        let transcript = parse_transcript(&body)?;
        tracing::debug!(chars = transcript.len(), "transcription complete");
        Ok(transcript)
    }
}

fn parse_transcript(body: &str) -> Result<String, serde_json::Error> {
    serde_json::from_str::<TranscriptionResponse>(body).map(|r| r.text.unwrap_or_default())
}
