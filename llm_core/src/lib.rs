use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Keeps replies short enough to speak back
pub const DEFAULT_MAX_TOKENS: u16 = 50;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chat completion API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("chat completion returned no choices")]
    EmptyResponse,
}

impl LlmError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            LlmError::Request(e) => e.status(),
            LlmError::Status { status, .. } => Some(*status),
            LlmError::EmptyResponse => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Structure for the OpenAI Chat API request
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u16,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Structure for the OpenAI Chat API response
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_reply(self) -> Result<String, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Turns a transcript into a short spoken-style reply
#[derive(Clone)]
pub struct Responder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u16,
}

impl Responder {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send `prompt` as a single user message and return the first choice.
    /// An empty prompt is sent as-is.
    pub async fn reply(&self, prompt: &str) -> Result<String, LlmError> {
        let req_body = ChatRequest {
            model: &self.model,
            messages: vec![Message { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let reply = response.json::<ChatResponse>().await?.into_reply()?;
        tracing::debug!(chars = reply.len(), "chat completion received");
        Ok(reply)
    }
}
