use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("speech synthesis produced no audio")]
    NoAudio,
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    /// Message safe to show a client. Upstream bodies and keys never appear here.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::InvalidInput(msg) => msg.clone(),
            ApiError::Pipeline(e) => e.public_message().to_string(),
            ApiError::NoAudio => crate::pipeline::SYNTHESIS_FAILED.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) | ApiError::NoAudio => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ApiError::InvalidInput(msg) => tracing::warn!("Rejected request: {}", msg),
            other => tracing::error!("Request failed: {}", other),
        }

        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
