//! Codec for encoding and decoding realtime frames.
//!
//! Frames are JSON objects. Several frames may share one transport message,
//! separated by newlines.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::frames::{Command, Reply};

/// Maximum encoded size of a single transport message (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Separator between frames batched in one transport message.
pub const FRAME_SEPARATOR: char = '\n';

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid frame data.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

fn check_size(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(())
}

/// Encode a batch of frames into one newline-separated message.
///
/// # Errors
///
/// Returns an error if a frame cannot be serialized or the result is too large.
pub fn encode_frames<T: Serialize>(frames: &[T]) -> Result<String, ProtocolError> {
    let mut out = String::new();
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 {
            out.push(FRAME_SEPARATOR);
        }
        out.push_str(&serde_json::to_string(frame)?);
        check_size(out.len())?;
    }
    Ok(out)
}

/// Decode every frame in a newline-separated message.
///
/// Blank lines are skipped.
///
/// # Errors
///
/// Returns an error if the message is too large or any line is not a valid frame.
pub fn decode_frames<T: DeserializeOwned>(data: &str) -> Result<Vec<T>, ProtocolError> {
    check_size(data.len())?;
    data.split(FRAME_SEPARATOR)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(ProtocolError::from))
        .collect()
}

/// Encode a single command.
///
/// # Errors
///
/// Returns an error if the command is too large or encoding fails.
pub fn encode(command: &Command) -> Result<String, ProtocolError> {
    encode_frames(std::slice::from_ref(command))
}

/// Encode several commands into one message.
///
/// # Errors
///
/// Returns an error if the batch is empty, too large, or encoding fails.
pub fn encode_batch(commands: &[Command]) -> Result<String, ProtocolError> {
    if commands.is_empty() {
        return Err(ProtocolError::Invalid("empty command batch".to_string()));
    }
    encode_frames(commands)
}

/// Decode the replies contained in one message from the broker.
///
/// # Errors
///
/// Returns an error if the message is too large or malformed.
pub fn decode(data: &str) -> Result<Vec<Reply>, ProtocolError> {
    decode_frames(data)
}

/// Encode a single reply. Used by broker-side code and for pongs.
///
/// # Errors
///
/// Returns an error if the reply is too large or encoding fails.
pub fn encode_reply(reply: &Reply) -> Result<String, ProtocolError> {
    encode_frames(std::slice::from_ref(reply))
}

/// Decode the commands contained in one message from a client.
///
/// # Errors
///
/// Returns an error if the message is too large or malformed.
pub fn decode_commands(data: &str) -> Result<Vec<Command>, ProtocolError> {
    decode_frames(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ReplyKind;
    use serde_json::json;

    #[test]
    fn test_decode_batched_replies() {
        let data = "{\"id\":1,\"connect\":{\"client\":\"c1\"}}\n{}\n{\"push\":{\"channel\":\"topic:all\",\"pub\":{\"data\":{\"content\":\"hi\"}}}}\n";
        let replies = decode(data).unwrap();

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], Reply::connected(1, "c1"));
        assert_eq!(replies[1].kind(), ReplyKind::Ping);
        assert_eq!(replies[2], Reply::push("topic:all", json!({"content": "hi"})));
    }

    #[test]
    fn test_encode_batch_is_newline_separated() {
        let batch = encode_batch(&[
            Command::subscribe(1, "topic:general"),
            Command::subscribe(2, "topic:all"),
        ])
        .unwrap();

        assert_eq!(batch.lines().count(), 2);
        let commands = decode_commands(&batch).unwrap();
        assert_eq!(commands[1], Command::subscribe(2, "topic:all"));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(encode_batch(&[]), Err(ProtocolError::Invalid(_))));
    }

    #[test]
    fn test_decode_malformed() {
        match decode("{\"id\":") {
            Err(ProtocolError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let large = "x".repeat(MAX_FRAME_SIZE + 1);
        let frame = Command::publish(1, "topic:general", json!(large));

        match encode(&frame) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_pong_encoding() {
        assert_eq!(encode_reply(&Reply::ping()).unwrap(), "{}");
    }
}
