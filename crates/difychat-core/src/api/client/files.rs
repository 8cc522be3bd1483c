//! `POST /files/upload`

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use tracing::info;

use super::core::{DifyClient, Operation};
use crate::api::types::{FileUpload, UploadedFile};
use crate::error::ClientError;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

impl DifyClient {
    /// Upload a file for later use as a `local_file` attachment
    pub async fn upload_file(
        &self,
        file: FileUpload,
        user: &str,
        session_id: &str,
    ) -> Result<UploadedFile, ClientError> {
        // Check the credential before building the (possibly large) form
        let request = self.build_request(Operation::UploadFile, Method::POST, "/files/upload")?;

        let user = self.resolve_user(user).to_string();
        info!(
            "Uploading file '{}' ({} bytes)",
            file.file_name,
            file.bytes.len()
        );

        let mime_type = file.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(mime_type)
            .map_err(|e| ClientError::InvalidRequest {
                detail: format!("invalid MIME type '{mime_type}': {e}"),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("user", user)
            .text("session_id", session_id.to_string());

        let response = self
            .send(Operation::UploadFile, request.multipart(form))
            .await?;
        self.read_json(Operation::UploadFile, response).await
    }
}
