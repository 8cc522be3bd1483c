//! `POST /chat-messages`

use reqwest::{Method, Response};
use tracing::info;

use super::core::{DifyClient, Operation};
use crate::api::types::{ChatMessageBody, ChatRequest, ChatResult};
use crate::error::ClientError;

/// What `send_chat_message` hands back
#[derive(Debug)]
pub enum ChatResponse {
    /// Open response whose body is the event stream, not yet read
    Streaming(Response),
    /// Complete answer of a blocking request
    Blocking(ChatResult),
}

impl DifyClient {
    /// Send a chat message
    ///
    /// Streaming requests return as soon as the status line is in; the body is
    /// left for [`crate::api::ChatEventStream`] to decode.
    pub async fn send_chat_message(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ClientError> {
        let user = self.resolve_user(&request.user);
        let body = ChatMessageBody::new(request, user);
        info!(
            "Sending chat message ({:?}, conversation={:?}, {} files)",
            request.response_mode,
            request.conversation_id,
            request.files.len()
        );

        let http_request =
            self.build_json_request(Operation::SendMessage, Method::POST, "/chat-messages", &body)?;
        let response = self.send(Operation::SendMessage, http_request).await?;

        if request.is_streaming() {
            Ok(ChatResponse::Streaming(response))
        } else {
            let result = self.read_json(Operation::SendMessage, response).await?;
            Ok(ChatResponse::Blocking(result))
        }
    }
}
