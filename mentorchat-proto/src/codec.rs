//! Serialization and deserialization of live-channel frames.
//!
//! Frames travel as WebSocket text messages containing one JSON object each.

use crate::channel::{ClientFrame, ServerFrame};

/// Maximum accepted size of a single frame in bytes (64 KB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame exceeds [`MAX_FRAME_SIZE`].
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a [`ClientFrame`] into JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] from JSON text.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for oversized input, or
/// `CodecError::Serialization` if the text is not a valid client frame.
pub fn decode_client(text: &str) -> Result<ClientFrame, CodecError> {
    check_size(text)?;
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ServerFrame`] into JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] from JSON text.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for oversized input, or
/// `CodecError::Serialization` if the text is not a valid server frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, CodecError> {
    check_size(text)?;
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

fn check_size(text: &str) -> Result<(), CodecError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidFrame(format!(
            "frame is {} bytes, max {MAX_FRAME_SIZE}",
            text.len()
        )));
    }
    Ok(())
}
