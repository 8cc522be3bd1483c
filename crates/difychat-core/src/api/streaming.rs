//! Streaming types for chat responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// One answer fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
    pub content: String,
    pub message_id: String,
    pub conversation_id: String,
    /// Generation id; target of a stop request
    pub task_id: Option<String>,
}

/// The server finished the answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnd {
    pub message_id: String,
    pub conversation_id: String,
    pub metadata: Value,
}

/// Error reported by the server inside the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
    pub code: Option<String>,
}

/// Events decoded from a chat response stream, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// `event: message`
    Message(MessageChunk),
    /// `event: message_end`
    MessageEnd(MessageEnd),
    /// `event: error` (the stream keeps going)
    Error(ServerError),
    /// The body could not be read any further; always the last event
    ReadFailed(ClientError),
    /// The stream was cancelled locally; always the last event
    Aborted,
}

impl StreamEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::ReadFailed(_) | StreamEvent::Aborted)
    }
}

/// Error delivered to [`super::StreamHandler::on_error`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamError {
    Server(ServerError),
    Transport(ClientError),
}

impl StreamError {
    /// Message suitable for display
    pub fn message(&self) -> String {
        match self {
            StreamError::Server(err) => err.message.clone(),
            StreamError::Transport(err) => err.to_string(),
        }
    }
}

/// Delivered to [`super::StreamHandler::on_end`]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// Normal `message_end`
    Completed(MessageEnd),
    /// Stopped locally before the answer finished
    Aborted,
}

impl StreamEnd {
    pub fn is_aborted(&self) -> bool {
        matches!(self, StreamEnd::Aborted)
    }
}
