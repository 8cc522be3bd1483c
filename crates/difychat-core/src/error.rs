//! Client error taxonomy
//!
//! Every failure a caller can observe is one of these variants. Request-level
//! errors are returned from the operation that failed; stream-level errors are
//! only ever delivered through the stream (see [`crate::api::StreamEvent`]).

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::config::Locale;

/// Errors produced by the Dify client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The endpoint requires a bearer token and none has been set
    #[error("API key is not set")]
    CredentialMissing,

    /// The server rejected the configured API key
    #[error("API key rejected: {message}")]
    CredentialRejected { message: String },

    /// The host could not be reached (DNS, connect, TLS, timeout, dropped connection)
    #[error("network unavailable: {detail}")]
    NetworkUnavailable {
        detail: String,
        /// True when the connection went away while a response stream was being read
        mid_stream: bool,
    },

    /// The host answered with a non-success status
    #[error("request failed: {message}")]
    RequestFailed { status: Option<u16>, message: String },

    /// The request could not be built
    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },

    /// A success response carried a body we could not decode
    #[error("invalid response body: {detail}")]
    InvalidResponse { detail: String },

    /// One stream frame was malformed and skipped (never terminal)
    #[error("skipped malformed stream frame: {detail}")]
    StreamDecodeSkipped { detail: String },

    /// The response stream broke while being read (terminal for that stream)
    #[error("stream read failed: {detail}")]
    StreamReadFailed { detail: String },
}

impl ClientError {
    /// Classify an error returned while sending a request or awaiting its headers
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if is_network_error(err) {
            return ClientError::NetworkUnavailable {
                detail: err.to_string(),
                mid_stream: false,
            };
        }
        if err.is_builder() {
            return ClientError::InvalidRequest {
                detail: err.to_string(),
            };
        }
        ClientError::RequestFailed {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Classify an error returned while reading a response body chunk
    pub fn from_stream_read(err: &reqwest::Error) -> Self {
        if is_network_error(err) {
            ClientError::NetworkUnavailable {
                detail: err.to_string(),
                mid_stream: true,
            }
        } else {
            ClientError::StreamReadFailed {
                detail: err.to_string(),
            }
        }
    }

    /// Whether this error means the host could not be reached
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::NetworkUnavailable { .. })
    }

    /// Actionable message for the operator, in their locale
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (ClientError::CredentialMissing, Locale::English) => {
                "API key is not set. Please set your API key first.".to_string()
            }
            (ClientError::CredentialMissing, Locale::Chinese) => {
                "API密钥未设置，请先设置API密钥".to_string()
            }
            (ClientError::CredentialRejected { .. }, Locale::English) => {
                "API key is invalid or not set correctly. Please check your API key.".to_string()
            }
            (ClientError::CredentialRejected { .. }, Locale::Chinese) => {
                "API密钥无效或未正确设置，请检查您的API密钥".to_string()
            }
            (ClientError::NetworkUnavailable { mid_stream: true, .. }, Locale::English) => {
                "The network connection was interrupted. Please check your network connection."
                    .to_string()
            }
            (ClientError::NetworkUnavailable { mid_stream: true, .. }, Locale::Chinese) => {
                "网络连接中断，请检查您的网络连接".to_string()
            }
            (ClientError::NetworkUnavailable { .. }, Locale::English) => {
                "Network connection error. Please check your network connection.".to_string()
            }
            (ClientError::NetworkUnavailable { .. }, Locale::Chinese) => {
                "网络连接错误，请检查您的网络连接".to_string()
            }
            (ClientError::RequestFailed { message, .. }, _) => message.clone(),
            (ClientError::StreamReadFailed { .. }, Locale::English) => {
                "Failed to read the streamed response. Please try again.".to_string()
            }
            (ClientError::StreamReadFailed { .. }, Locale::Chinese) => "读取流数据失败".to_string(),
            (ClientError::StreamDecodeSkipped { .. }, Locale::English) => {
                "Part of the response could not be decoded.".to_string()
            }
            (ClientError::StreamDecodeSkipped { .. }, Locale::Chinese) => {
                "解析流数据失败".to_string()
            }
            (
                ClientError::InvalidRequest { detail } | ClientError::InvalidResponse { detail },
                Locale::English,
            ) => format!("Something went wrong ({detail}). Please try again later."),
            (
                ClientError::InvalidRequest { detail } | ClientError::InvalidResponse { detail },
                Locale::Chinese,
            ) => format!("出现错误（{detail}），请稍后重试"),
        }
    }
}

/// Connection-level failures: the host was never reached or the link dropped
fn is_network_error(err: &reqwest::Error) -> bool {
    if err.is_connect() || err.is_timeout() {
        return true;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
