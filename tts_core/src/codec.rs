use base64::{engine::general_purpose, DecodeError, Engine as _};

/// Encode raw audio bytes for a JSON envelope.
pub fn encode_audio_base64(audio: &[u8]) -> String {
    general_purpose::STANDARD.encode(audio)
}

/// Decode the `audio` field of an inbound envelope.
pub fn decode_audio_base64(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    general_purpose::STANDARD.decode(encoded.trim())
}
