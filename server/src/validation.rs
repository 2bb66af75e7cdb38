use crate::error::ApiError;

/// Validate an inbound audio payload.
///
/// Only size is checked; the format is left to the speech-to-text service.
pub fn validate_audio(audio: &[u8], max_bytes: usize) -> Result<(), ApiError> {
    if audio.is_empty() {
        return Err(ApiError::InvalidInput("Audio cannot be empty".to_string()));
    }
    if audio.len() > max_bytes {
        return Err(ApiError::InvalidInput(format!(
            "Audio too large (max {} bytes)",
            max_bytes
        )));
    }
    Ok(())
}

/// Largest base64 text that can decode to `max_bytes` of audio
pub fn max_encoded_len(max_bytes: usize) -> usize {
    max_bytes.div_ceil(3).saturating_mul(4)
}
