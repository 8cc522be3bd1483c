//! Chat session facade
//!
//! A [`ChatSession`] bundles the HTTP client, the credential, the default user
//! and the cancellation coordinator for one conversation context. Independent
//! contexts use independent sessions.

mod cancellation;

#[cfg(test)]
mod tests;

pub use cancellation::{CancellationCoordinator, StreamBinding};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{
    drive_stream, response_body, Ack, ByteStream, ChatEventStream, ChatRequest, ChatResponse,
    ChatResult, DifyClient, FileUpload, Rating, ResponseMode, StreamHandler, UploadedFile,
};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Public entry point: one conversation context talking to one Dify app
#[derive(Debug, Clone)]
pub struct ChatSession {
    client: DifyClient,
    coordinator: Arc<CancellationCoordinator>,
    user: String,
    session_id: String,
}

impl ChatSession {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::with_client(DifyClient::new(config)?))
    }

    pub fn with_client(client: DifyClient) -> Self {
        let user = client.config().default_user.clone();
        Self {
            client,
            coordinator: CancellationCoordinator::new(),
            user,
            session_id: String::new(),
        }
    }

    /// Use `user` for every call that does not name one
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Tag every call with `session_id`
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn client(&self) -> &DifyClient {
        &self.client
    }

    pub fn coordinator(&self) -> &Arc<CancellationCoordinator> {
        &self.coordinator
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_api_key(&self, key: impl Into<String>) {
        self.client.set_api_key(key);
    }

    /// Send a chat message with this session's user and session id filled in
    pub async fn send_chat_message(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, ClientError> {
        let request = self.fill_defaults(request);
        self.client.send_chat_message(&request).await
    }

    /// Send a blocking chat message and return the complete answer
    pub async fn blocking_chat(&self, mut request: ChatRequest) -> Result<ChatResult, ClientError> {
        request.response_mode = ResponseMode::Blocking;
        match self.send_chat_message(request).await? {
            ChatResponse::Blocking(result) => Ok(result),
            ChatResponse::Streaming(_) => Err(ClientError::InvalidResponse {
                detail: "expected a blocking response".to_string(),
            }),
        }
    }

    /// Send a streaming chat message and return its bound event stream
    pub async fn stream_chat(&self, mut request: ChatRequest) -> Result<ChatEventStream, ClientError> {
        request.response_mode = ResponseMode::Streaming;
        match self.send_chat_message(request).await? {
            ChatResponse::Streaming(response) => Ok(self.open_stream(response)),
            ChatResponse::Blocking(_) => Err(ClientError::InvalidResponse {
                detail: "expected a streaming response".to_string(),
            }),
        }
    }

    /// Send a streaming chat message and deliver its events to `handler`
    ///
    /// Request-level failures are returned; everything after the response
    /// headers arrive goes to the handler only.
    pub async fn chat<H>(&self, request: ChatRequest, handler: &mut H) -> Result<(), ClientError>
    where
        H: StreamHandler + ?Sized,
    {
        let stream = self.stream_chat(request).await?;
        drive_stream(stream, handler).await;
        Ok(())
    }

    /// Decode a streaming response into `handler`, bound to this session's stop
    pub async fn handle_stream_response<H>(&self, response: reqwest::Response, handler: &mut H)
    where
        H: StreamHandler + ?Sized,
    {
        drive_stream(self.open_stream(response), handler).await;
    }

    /// Pull-based decoder over a streaming response, bound to this session's stop
    pub fn open_stream(&self, response: reqwest::Response) -> ChatEventStream {
        self.bind_stream(response_body(response))
    }

    /// Bind an arbitrary body to this session; it becomes the active stream
    pub fn bind_stream(&self, body: ByteStream) -> ChatEventStream {
        let token = CancellationToken::new();
        let binding = self.coordinator.bind(token.clone());
        ChatEventStream::new(body, token)
            .with_binding(binding)
            .with_thinking_rewrite(self.client.config().rewrite_thinking)
    }

    /// Stop generation of `task_id` started for `user`
    ///
    /// Aborts the local stream first (if one is active), then always asks the
    /// server to stop, since the generation may belong to another context.
    /// The server only honors the stop when `user` matches the chat request's
    /// user; an empty `user` means this session's user.
    pub async fn stop_chat_message(&self, task_id: &str, user: &str) -> Result<Ack, ClientError> {
        if self.coordinator.abort_active() {
            info!("Local stream aborted, stopping task {} remotely", task_id);
        }
        let result = self
            .client
            .stop_chat_message(task_id, self.user_or_default(user), &self.session_id)
            .await;
        if let Err(err) = &result {
            warn!("Remote stop of task {} failed: {}", task_id, err);
        }
        result
    }

    pub async fn upload_file(
        &self,
        file: FileUpload,
        user: &str,
    ) -> Result<UploadedFile, ClientError> {
        self.client
            .upload_file(file, self.user_or_default(user), &self.session_id)
            .await
    }

    pub async fn get_suggested_questions(
        &self,
        message_id: &str,
        user: &str,
    ) -> Result<Vec<String>, ClientError> {
        self.client
            .get_suggested_questions(message_id, self.user_or_default(user), &self.session_id)
            .await
    }

    pub async fn feedback_message(
        &self,
        message_id: &str,
        rating: Option<Rating>,
        user: &str,
        content: &str,
    ) -> Result<Ack, ClientError> {
        self.client
            .feedback_message(
                message_id,
                rating,
                self.user_or_default(user),
                content,
                &self.session_id,
            )
            .await
    }

    /// `user`, or this session's user when `user` is blank
    fn user_or_default<'a>(&'a self, user: &'a str) -> &'a str {
        if user.trim().is_empty() {
            &self.user
        } else {
            user
        }
    }

    fn fill_defaults(&self, mut request: ChatRequest) -> ChatRequest {
        if request.user.trim().is_empty() {
            request.user = self.user.clone();
        }
        if request.session_id.is_none() && !self.session_id.is_empty() {
            request.session_id = Some(self.session_id.clone());
        }
        request
    }
}
