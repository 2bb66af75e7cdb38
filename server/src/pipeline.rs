//! Transcriber -> Responder -> Synthesizer, one stage at a time.

use llm_core::{LlmError, Responder};
use stt_core::{SttError, Transcriber};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tts_core::{Synthesizer, TtsError};

use crate::config::ServerConfig;
use crate::retry::{with_retry, Attempt, RetryError, RetryPolicy};

pub const TRANSCRIPTION_FAILED: &str = "Error processing speech-to-text";
pub const RESPONSE_FAILED: &str = "Error with the AI response";
pub const SYNTHESIS_FAILED: &str = "Failed to generate speech response.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transcription failed: {0}")]
    Transcription(#[source] SttError),

    #[error("chat completion failed: {0}")]
    Response(#[source] LlmError),

    #[error("speech synthesis failed: {0}")]
    Synthesis(#[source] TtsError),
}

impl PipelineError {
    /// Generic text for clients; the detailed cause stays in the logs
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::Transcription(_) => TRANSCRIPTION_FAILED,
            PipelineError::Response(_) => RESPONSE_FAILED,
            PipelineError::Synthesis(_) => SYNTHESIS_FAILED,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        match self {
            PipelineError::Transcription(e) => e.is_unauthorized(),
            PipelineError::Response(e) => e.is_unauthorized(),
            PipelineError::Synthesis(e) => e.is_unauthorized(),
        }
    }
}

/// Result of one pipeline run. `audio` is `None` when synthesis failed
/// without an auth error.
#[derive(Debug)]
pub struct Turn {
    pub transcript: String,
    pub reply: String,
    pub audio: Option<Vec<u8>>,
}

pub struct Pipeline {
    transcriber: Transcriber,
    responder: Responder,
    synthesizer: Synthesizer,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        transcriber: Transcriber,
        responder: Responder,
        synthesizer: Synthesizer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transcriber,
            responder,
            synthesizer,
            retry,
        }
    }

    /// Wire all three stages from the config, sharing one HTTP client
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .build()?;
        let creds = &config.credentials;

        let transcriber = Transcriber::new(client.clone(), creds.openai_api_key.clone())
            .with_base_url(config.openai_base_url.clone());
        let responder = Responder::new(client.clone(), creds.openai_api_key.clone())
            .with_base_url(config.openai_base_url.clone());
        let synthesizer = Synthesizer::new(
            client,
            creds.elevenlabs_api_key.clone(),
            creds.voice_id.clone(),
        )
        .with_base_url(config.elevenlabs_base_url.clone());
        info!(voice = synthesizer.voice_id(), "pipeline ready");

        Ok(Self::new(transcriber, responder, synthesizer, config.retry_policy()))
    }

    /// Single-attempt run used by the streaming transport.
    pub async fn run_streaming(&self, audio: &[u8]) -> Result<Turn, PipelineError> {
        let transcript = self
            .transcriber
            .transcribe(audio)
            .await
            .map_err(PipelineError::Transcription)?;
        debug!(transcript = %transcript, "transcribed text");

        let reply = self.respond(&transcript).await?;

        let audio = match self.synthesizer.synthesize(&reply).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                error!(error = %e, "speech synthesis failed");
                None
            }
        };

        Ok(Turn {
            transcript,
            reply,
            audio,
        })
    }

    /// Run used by the upload transport: transcription and synthesis are
    /// retried under the configured policy, the chat completion is not.
    pub async fn run_with_retry(&self, audio: &[u8]) -> Result<Turn, PipelineError> {
        info!("Converting speech to text...");
        let transcriber = &self.transcriber;
        let transcript = with_retry(&self.retry, || async move {
            Attempt::from(transcriber.transcribe(audio).await)
        })
        .await
        .map_err(|e| PipelineError::Transcription(e.into_inner()))?;
        debug!(transcript = %transcript, "transcribed text");

        info!("Generating AI response...");
        let reply = self.respond(&transcript).await?;

        info!("Converting AI response to speech...");
        let synthesizer = &self.synthesizer;
        let text = reply.as_str();
        let audio = match with_retry(&self.retry, || async move {
            Attempt::from(synthesizer.synthesize(text).await)
        })
        .await
        {
            Ok(audio) => Some(audio),
            Err(RetryError::Exhausted { attempts, last }) => {
                error!(attempts, error = %last, "Failed to get a response after retries");
                None
            }
            Err(RetryError::Unauthorized(e)) => return Err(PipelineError::Synthesis(e)),
        };

        Ok(Turn {
            transcript,
            reply,
            audio,
        })
    }

    async fn respond(&self, transcript: &str) -> Result<String, PipelineError> {
        if transcript.is_empty() {
            warn!("empty transcript, asking for a reply anyway");
        }
        let reply = self
            .responder
            .reply(transcript)
            .await
            .map_err(PipelineError::Response)?;
        debug!(reply = %reply, "AI response");
        Ok(reply)
    }
}
