//! SSE (Server-Sent Events) frame handling
//!
//! Dify streams one `data: <json>` frame per event, frames separated by a blank
//! line. Network reads do not line up with frames, so bytes are buffered until
//! a full frame is available.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::streaming::{MessageChunk, MessageEnd, ServerError, StreamEvent};
use crate::error::ClientError;

/// Separates two frames
pub const FRAME_DELIMITER: &str = "\n\n";

/// Prefix of every frame that carries an event
pub const DATA_PREFIX: &str = "data: ";

/// Accumulates stream bytes and hands out complete frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    /// Decoded text not yet terminated by a delimiter
    text: String,
    /// Trailing bytes of a UTF-8 sequence split across reads
    partial_utf8: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes, in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        // Earlier text held no delimiter; only its tail can start one
        let mut search_from = self
            .text
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);
        while !self.text.is_char_boundary(search_from) {
            search_from -= 1;
        }
        self.decode_utf8(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.text[search_from..].find(FRAME_DELIMITER) {
            let end = search_from + offset;
            frames.push(self.text[start..end].to_string());
            start = end + FRAME_DELIMITER.len();
            search_from = start;
        }
        self.text.drain(..start);
        frames
    }

    /// Text buffered after the last delimiter
    pub fn remainder(&self) -> &str {
        &self.text
    }

    /// Whether any unterminated data is still buffered
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.partial_utf8.is_empty()
    }

    fn decode_utf8(&mut self, bytes: &[u8]) {
        self.partial_utf8.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&self.partial_utf8) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.partial_utf8.clear();
                    return;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.partial_utf8[..valid_up_to]));
                    match e.error_len() {
                        // Invalid sequence: replace it and keep going
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.partial_utf8.drain(..valid_up_to + len);
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            self.partial_utf8.drain(..valid_up_to);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// JSON payload of a frame; fields are optional because each event uses a subset
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

/// Decode one frame
///
/// Returns `Ok(None)` for frames that carry no event we handle (comments,
/// `event:` lines, `ping`, workflow and agent events). A `data: ` payload that
/// is not a JSON object is a [`ClientError::StreamDecodeSkipped`].
pub fn parse_frame(frame: &str) -> Result<Option<StreamEvent>, ClientError> {
    let Some(payload) = frame.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let value: Value =
        serde_json::from_str(payload).map_err(|e| ClientError::StreamDecodeSkipped {
            detail: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(ClientError::StreamDecodeSkipped {
            detail: "frame payload is not a JSON object".to_string(),
        });
    }
    let raw: RawFrame =
        serde_json::from_value(value).map_err(|e| ClientError::StreamDecodeSkipped {
            detail: e.to_string(),
        })?;

    let event = match raw.event.as_deref() {
        Some("message") => StreamEvent::Message(MessageChunk {
            content: raw.answer.unwrap_or_default(),
            message_id: raw.message_id.unwrap_or_default(),
            conversation_id: raw.conversation_id.unwrap_or_default(),
            task_id: raw.task_id,
        }),
        Some("message_end") => StreamEvent::MessageEnd(MessageEnd {
            message_id: raw.message_id.unwrap_or_default(),
            conversation_id: raw.conversation_id.unwrap_or_default(),
            metadata: raw.metadata.unwrap_or(Value::Null),
        }),
        Some("error") => StreamEvent::Error(ServerError {
            message: raw.message.unwrap_or_default(),
            code: raw.code.map(|code| match code {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        }),
        other => {
            debug!("  -> Ignoring SSE event {:?}", other);
            return Ok(None);
        }
    };

    Ok(Some(event))
}
