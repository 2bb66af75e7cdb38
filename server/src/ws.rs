//! Streaming transport on `/ws`.
//!
//! Each text frame carries `{"audio": <base64 WAV>}` and is answered with
//! `{"audio": <base64 MP3>}` before the next frame is read. Malformed
//! frames and pipeline failures close the connection without a reply.
//! A turn whose synthesis failed is answered with `{"error": ...}` and the
//! connection stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension,
};
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Instrument};

use crate::{
    error::ApiError,
    pipeline::SYNTHESIS_FAILED,
    validation::{max_encoded_len, validate_audio},
    AppState, RequestId,
};

/// Slack for the JSON wrapper around the base64 payload
const ENVELOPE_OVERHEAD_BYTES: usize = 1024;

#[derive(Deserialize)]
struct AudioMessage {
    audio: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OutboundMessage {
    Audio { audio: String },
    Error { error: &'static str },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(RequestId(connection_id)): Extension<RequestId>,
) -> impl IntoResponse {
    let max_frame =
        max_encoded_len(state.config.max_audio_bytes).saturating_add(ENVELOPE_OVERHEAD_BYTES);
    let span = tracing::info_span!("ws", connection_id = %connection_id);
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, state).instrument(span))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket connection opened");

    loop {
        let message = match socket.recv().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!("WebSocket receive error: {e}");
                break;
            }
            None => {
                info!("WebSocket client disconnected");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("WebSocket client disconnected");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Binary(_) => {
                error!("Binary frames are not supported, closing connection");
                let _ = socket.close().await;
                break;
            }
        };

        info!("Received audio data from client");
        let reply = match process_turn(&state, text.as_str()).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Closing connection: {e}");
                let _ = socket.close().await;
                break;
            }
        };

        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not encode reply: {e}");
                let _ = socket.close().await;
                break;
            }
        };
        if let Err(e) = socket.send(Message::Text(payload.into())).await {
            warn!("Failed to send WS message: {e}");
            break;
        }
        match reply {
            OutboundMessage::Audio { .. } => info!("Audio response sent to client"),
            OutboundMessage::Error { .. } => warn!("Sent synthesis error frame to client"),
        }
    }
}

/// Decode one inbound frame and run the pipeline on it.
async fn process_turn(state: &AppState, frame: &str) -> Result<OutboundMessage, ApiError> {
    let audio = decode_frame(frame)?;
    validate_audio(&audio, state.config.max_audio_bytes)?;

    let turn = state.pipeline.run_streaming(&audio).await?;
    debug!(transcript = %turn.transcript, reply = %turn.reply, "turn complete");

    Ok(match turn.audio {
        Some(audio) => {
            info!("Audio successfully generated from AI response");
            OutboundMessage::Audio {
                audio: tts_core::encode_audio_base64(&audio),
            }
        }
        None => OutboundMessage::Error {
            error: SYNTHESIS_FAILED,
        },
    })
}

fn decode_frame(frame: &str) -> Result<Vec<u8>, ApiError> {
    let message: AudioMessage = serde_json::from_str(frame)
        .map_err(|e| ApiError::InvalidInput(format!("Expected {{\"audio\": <base64>}}: {e}")))?;
    tts_core::decode_audio_base64(&message.audio)
        .map_err(|e| ApiError::InvalidInput(format!("Audio is not valid base64: {e}")))
}
