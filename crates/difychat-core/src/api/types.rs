//! Request and response types for the Dify chat app API

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the server should deliver the answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Server-sent events, one frame per answer fragment
    #[default]
    Streaming,
    /// One JSON body once generation finishes
    Blocking,
}

/// How an attached file reaches the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    RemoteUrl,
    LocalFile,
}

/// A file sent along with a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    /// File kind, e.g. `image` or `document`
    #[serde(rename = "type")]
    pub kind: String,
    pub transfer_method: TransferMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

impl FileAttachment {
    /// Attach a file the server fetches from `url`
    pub fn remote(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            transfer_method: TransferMethod::RemoteUrl,
            url: Some(url.into()),
            upload_file_id: None,
        }
    }

    /// Attach a file previously uploaded through `/files/upload`
    pub fn uploaded(kind: impl Into<String>, upload_file_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            transfer_method: TransferMethod::LocalFile,
            url: None,
            upload_file_id: Some(upload_file_id.into()),
        }
    }
}

/// A chat message to send
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRequest {
    pub query: String,
    /// App-defined variable values
    pub inputs: HashMap<String, Value>,
    /// Continue an existing conversation; `None` starts a new one
    pub conversation_id: Option<String>,
    /// Empty means "use the configured default user"
    pub user: String,
    pub response_mode: ResponseMode,
    pub files: Vec<FileAttachment>,
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Streaming request for `query` with no inputs, files or conversation
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn blocking(mut self) -> Self {
        self.response_mode = ResponseMode::Blocking;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.response_mode == ResponseMode::Streaming
    }
}

/// Wire body of `POST /chat-messages`
#[derive(Debug, Serialize)]
pub(crate) struct ChatMessageBody<'a> {
    pub query: &'a str,
    pub inputs: &'a HashMap<String, Value>,
    pub user: &'a str,
    pub conversation_id: &'a str,
    pub response_mode: ResponseMode,
    pub files: &'a [FileAttachment],
    pub session_id: &'a str,
}

impl<'a> ChatMessageBody<'a> {
    /// `user` must already be resolved to a non-empty identity
    pub fn new(request: &'a ChatRequest, user: &'a str) -> Self {
        Self {
            query: &request.query,
            inputs: &request.inputs,
            user,
            conversation_id: request.conversation_id.as_deref().unwrap_or(""),
            response_mode: request.response_mode,
            files: &request.files,
            session_id: request.session_id.as_deref().unwrap_or(""),
        }
    }
}

/// Blocking-mode answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    /// Everything else the server sent (`created_at`, `mode`, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Local file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// MIME type; `application/octet-stream` when unknown
    pub mime_type: Option<String>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk, named after its last path component
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// File descriptor returned by `/files/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub created_by: Option<Value>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Generic `{"result": "success"}` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub result: String,
}

impl Ack {
    pub fn is_success(&self) -> bool {
        self.result == "success"
    }
}

/// Like or dislike; `None` in a feedback call revokes an earlier rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Like,
    Dislike,
}

/// Wire body of `POST /messages/{id}/feedbacks`
#[derive(Debug, Serialize)]
pub(crate) struct FeedbackBody<'a> {
    pub rating: Option<Rating>,
    pub user: &'a str,
    pub content: &'a str,
    pub session_id: &'a str,
}

/// Wire body of `POST /chat-messages/{task_id}/stop`
#[derive(Debug, Serialize)]
pub(crate) struct StopBody<'a> {
    pub user: &'a str,
    pub session_id: &'a str,
}

/// Suggested questions come back either bare or in Dify's `{result, data}` envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SuggestedQuestions {
    List(Vec<String>),
    Envelope {
        #[serde(default)]
        data: Vec<String>,
    },
}

impl SuggestedQuestions {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SuggestedQuestions::List(questions) => questions,
            SuggestedQuestions::Envelope { data } => data,
        }
    }
}

/// Error body the server sends with non-success statuses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
