// Configuration for the relay, read once at startup

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::retry::RetryPolicy;

/// Whisper rejects uploads above 25 MiB, so there is no point accepting more
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Headroom on top of the worst-case upload pipeline run
const UPLOAD_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set in the environment variables")]
    Missing(&'static str),
}

/// Upstream secrets. Not `Debug` so they never end up in logs.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub elevenlabs_api_key: String,
    pub voice_id: String,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub openai_base_url: String,
    pub elevenlabs_base_url: String,
    pub retry_max_attempts: u32,
    pub retry_delay_ms: u64,
    pub upstream_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_audio_bytes: usize,
    pub output_dir: Option<PathBuf>,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Required keys must be present and
    /// non-empty; optional tunables fall back to defaults when absent or
    /// unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let voice_id = required("VOICE_ID")?;
        let openai_api_key = required("OPENAI_API_KEY")?;
        let elevenlabs_api_key = required("ELEVENLABS_API_KEY")?;

        let host = optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = optional("PORT").and_then(|v| v.parse().ok()).unwrap_or(8000);

        let openai_base_url =
            optional("OPENAI_BASE_URL").unwrap_or_else(|| stt_core::DEFAULT_BASE_URL.to_string());
        let elevenlabs_base_url = optional("ELEVENLABS_BASE_URL")
            .unwrap_or_else(|| tts_core::DEFAULT_BASE_URL.to_string());

        let retry_max_attempts = optional("RETRY_MAX_ATTEMPTS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(3)
            .max(1);

        let retry_delay_ms = optional("RETRY_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(2000);

        let upstream_timeout_secs = optional("UPSTREAM_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let request_timeout_secs = optional("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let max_audio_bytes = optional("MAX_AUDIO_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_AUDIO_BYTES);

        let output_dir = optional("OUTPUT_DIR").map(PathBuf::from);

        let cors_allowed_origins = optional("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Ok(Self {
            host,
            port,
            credentials: Credentials {
                openai_api_key,
                elevenlabs_api_key,
                voice_id,
            },
            openai_base_url,
            elevenlabs_base_url,
            retry_max_attempts,
            retry_delay_ms,
            upstream_timeout_secs,
            request_timeout_secs,
            max_audio_bytes,
            output_dir,
            cors_allowed_origins,
        })
    }

    /// Host and port for `TcpListener::bind`; `HOST` may be a name or an IP
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deadline for `/upload-audio/`. Never shorter than a full retried run:
    /// every transcription and synthesis attempt, the chat completion and
    /// the delays between attempts, each call capped by the upstream timeout.
    pub fn upload_timeout(&self) -> Duration {
        let attempts = self.retry_max_attempts.max(1);
        let calls = attempts.saturating_mul(2).saturating_add(1);
        let delays = (attempts - 1).saturating_mul(2);
        let budget = self
            .upstream_timeout()
            .saturating_mul(calls)
            .saturating_add(self.retry_policy().delay.saturating_mul(delays))
            .saturating_add(UPLOAD_TIMEOUT_SLACK);
        budget.max(self.request_timeout())
    }
}
