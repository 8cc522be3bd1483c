//! Core HTTP client for the Dify chat app API
//!
//! Owns the reqwest client, the configuration and the bearer credential.
//! Endpoint methods live in the sibling modules.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::api::types::ErrorBody;
use crate::config::{ClientConfig, Locale};
use crate::error::ClientError;

/// Endpoint being called; selects the auth toggle and the fallback error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SendMessage,
    UploadFile,
    StopMessage,
    SuggestedQuestions,
    Feedback,
}

impl Operation {
    /// Whether this endpoint carries the bearer credential under `config`
    pub fn requires_auth(self, config: &ClientConfig) -> bool {
        match self {
            Operation::SendMessage => config.auth.send_message,
            Operation::UploadFile => config.auth.upload_file,
            Operation::StopMessage => config.auth.stop_message,
            Operation::SuggestedQuestions => config.auth.suggested_questions,
            Operation::Feedback => config.auth.feedback,
        }
    }

    /// Message used when the server's error body has none
    pub fn failure_text(self, locale: Locale) -> &'static str {
        match (self, locale) {
            (Operation::SendMessage, Locale::English) => "Request failed",
            (Operation::SendMessage, Locale::Chinese) => "请求失败",
            (Operation::UploadFile, Locale::English) => "File upload failed",
            (Operation::UploadFile, Locale::Chinese) => "上传文件失败",
            (Operation::StopMessage, Locale::English) => "Failed to stop the response",
            (Operation::StopMessage, Locale::Chinese) => "停止响应失败",
            (Operation::SuggestedQuestions, Locale::English) => {
                "Failed to fetch suggested questions"
            }
            (Operation::SuggestedQuestions, Locale::Chinese) => "获取建议问题失败",
            (Operation::Feedback, Locale::English) => "Failed to send feedback",
            (Operation::Feedback, Locale::Chinese) => "发送反馈失败",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Operation::SendMessage => "send message",
            Operation::UploadFile => "upload file",
            Operation::StopMessage => "stop message",
            Operation::SuggestedQuestions => "suggested questions",
            Operation::Feedback => "feedback",
        }
    }
}

/// Client for one Dify app
#[derive(Clone)]
pub struct DifyClient {
    http: reqwest::Client,
    config: ClientConfig,
    api_key: Arc<RwLock<Option<String>>>,
}

impl DifyClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("difychat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::InvalidRequest {
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self::with_http_client(http, config))
    }

    /// Use an existing reqwest client (shared pools, custom TLS, proxies)
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        Self {
            http,
            config,
            api_key: Arc::new(RwLock::new(api_key)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Set the bearer credential; an empty key unsets it
    pub fn set_api_key(&self, key: impl Into<String>) {
        let key = key.into();
        let mut guard = self.api_key.write();
        if key.is_empty() {
            debug!("API key cleared");
            *guard = None;
        } else {
            debug!("API key set ({} chars)", key.len());
            *guard = Some(key);
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }

    /// `user`, or the configured default when empty
    pub fn resolve_user<'a>(&'a self, user: &'a str) -> &'a str {
        if user.trim().is_empty() {
            &self.config.default_user
        } else {
            user
        }
    }

    /// Start a request, attaching the credential when the endpoint needs it
    ///
    /// Fails with [`ClientError::CredentialMissing`] before anything is sent
    /// when the endpoint needs a credential and none is set.
    pub(crate) fn build_request(
        &self,
        op: Operation,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, ClientError> {
        let url = self.config.endpoint(path);
        let mut request = self.http.request(method, url);

        if op.requires_auth(&self.config) {
            let guard = self.api_key.read();
            let key = guard.as_deref().ok_or_else(|| {
                error!("{}: API key is not set", op.name());
                ClientError::CredentialMissing
            })?;
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        Ok(request)
    }

    /// JSON-bodied request
    pub(crate) fn build_json_request<T: serde::Serialize + ?Sized>(
        &self,
        op: Operation,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<RequestBuilder, ClientError> {
        Ok(self
            .build_request(op, method, path)?
            .header(CONTENT_TYPE, "application/json")
            .json(body))
    }

    /// Send and turn non-success statuses into errors
    pub(crate) async fn send(
        &self,
        op: Operation,
        request: RequestBuilder,
    ) -> Result<Response, ClientError> {
        debug!("{}: sending request", op.name());
        let response = request.send().await.map_err(|e| {
            let err = ClientError::from_transport(&e);
            error!("{} failed: {}", op.name(), err);
            err
        })?;
        self.handle_error_response(op, response).await
    }

    /// Pass successful responses through; extract the server message otherwise
    pub(crate) async fn handle_error_response(
        &self,
        op: Operation,
        response: Response,
    ) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            info!("{}: {}", op.name(), status);
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let server_message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.is_empty());
        error!(
            "{} failed with {}: {}",
            op.name(),
            status,
            server_message.as_deref().unwrap_or(&body)
        );

        let rejected_key = status == reqwest::StatusCode::UNAUTHORIZED
            || server_message
                .as_deref()
                .is_some_and(|m| m.contains("API key"));
        let message =
            server_message.unwrap_or_else(|| op.failure_text(self.config.locale).to_string());

        if rejected_key {
            Err(ClientError::CredentialRejected { message })
        } else {
            Err(ClientError::RequestFailed {
                status: Some(status.as_u16()),
                message,
            })
        }
    }

    /// Decode a JSON success body
    pub(crate) async fn read_json<T: DeserializeOwned>(
        &self,
        op: Operation,
        response: Response,
    ) -> Result<T, ClientError> {
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                error!("{}: undecodable response body: {}", op.name(), e);
                ClientError::InvalidResponse {
                    detail: e.to_string(),
                }
            } else {
                ClientError::from_stream_read(&e)
            }
        })
    }
}

impl std::fmt::Debug for DifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifyClient")
            .field("base_url", &self.config.base_url)
            .field("has_api_key", &self.has_api_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    #[test]
    fn test_auth_toggles() {
        let config = ClientConfig::default();
        assert!(!Operation::SendMessage.requires_auth(&config));
        assert!(Operation::UploadFile.requires_auth(&config));
        assert!(!Operation::Feedback.requires_auth(&config));

        let config = ClientConfig {
            auth: AuthConfig::all(),
            ..ClientConfig::default()
        };
        assert!(Operation::SendMessage.requires_auth(&config));
        assert!(Operation::Feedback.requires_auth(&config));
    }

    #[test]
    fn test_set_api_key() {
        let client = DifyClient::new(ClientConfig::default()).unwrap();
        assert!(!client.has_api_key());

        client.set_api_key("app-123");
        assert!(client.has_api_key());
        // Clones share the credential
        let clone = client.clone();
        clone.set_api_key("");
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_missing_key_fails_before_sending() {
        let client = DifyClient::new(ClientConfig::default()).unwrap();
        let result = client.build_request(Operation::UploadFile, Method::POST, "/files/upload");
        assert_eq!(result.unwrap_err(), ClientError::CredentialMissing);

        // Endpoints without the toggle go through
        assert!(client
            .build_request(Operation::SendMessage, Method::POST, "/chat-messages")
            .is_ok());
    }

    #[test]
    fn test_resolve_user() {
        let client = DifyClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.resolve_user(""), "default_user");
        assert_eq!(client.resolve_user("  "), "default_user");
        assert_eq!(client.resolve_user("alice"), "alice");
    }

    #[test]
    fn test_debug_hides_key() {
        let client = DifyClient::new(ClientConfig::default()).unwrap();
        client.set_api_key("app-secret");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("app-secret"));
        assert!(debug.contains("has_api_key: true"));
    }
}
