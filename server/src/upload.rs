// Request/response transport: one multipart upload in, one MP3 out

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use tracing::{debug, error, info, Instrument};

use crate::{error::ApiError, validation::validate_audio, AppState, RequestId};

/// Multipart field carrying the audio file
pub const FILE_FIELD: &str = "file";

pub async fn upload_audio(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let span = tracing::info_span!("upload", request_id = %request_id);
    process_upload(state, request_id, multipart)
        .instrument(span)
        .await
}

async fn process_upload(
    state: AppState,
    request_id: String,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let audio = read_file_field(&mut multipart).await?;
    validate_audio(&audio, state.config.max_audio_bytes)?;
    info!(audio_bytes = audio.len(), "Audio upload received");

    let turn = state.pipeline.run_with_retry(&audio).await.map_err(|e| {
        error!(auth_failure = e.is_auth_failure(), "Pipeline failed: {e}");
        ApiError::from(e)
    })?;
    debug!("Text extracted from speech: {}", turn.transcript);
    debug!("AI Response: {}", turn.reply);

    let Some(audio_response) = turn.audio else {
        error!("Failed to generate speech.");
        return Err(ApiError::NoAudio);
    };

    if let Some(dir) = &state.config.output_dir {
        match persist_audio(dir, &request_id, &audio_response).await {
            Ok(path) => info!("Generated audio saved as {}", path.display()),
            Err(e) => error!("Could not save generated audio in {}: {e}", dir.display()),
        }
    }

    Ok((
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from(audio_response),
    )
        .into_response())
}

/// Pull the bytes of the `file` field, skipping any other form fields.
async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("Could not read uploaded file: {e}")))?;
        return Ok(bytes.to_vec());
    }
    Err(ApiError::InvalidInput(format!(
        "Missing multipart field '{FILE_FIELD}'"
    )))
}

/// Write the reply under a name unique to this request.
async fn persist_audio(dir: &Path, request_id: &str, audio: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{request_id}.mp3"));
    tokio::fs::write(&path, audio).await?;
    Ok(path)
}
