//! Message control endpoints: stop, suggested questions, feedback

use reqwest::Method;
use tracing::info;

use super::core::{DifyClient, Operation};
use crate::api::types::{Ack, FeedbackBody, Rating, StopBody, SuggestedQuestions};
use crate::error::ClientError;

impl DifyClient {
    /// Ask the server to stop generating for `task_id`
    ///
    /// `user` must match the user of the original chat request.
    pub async fn stop_chat_message(
        &self,
        task_id: &str,
        user: &str,
        session_id: &str,
    ) -> Result<Ack, ClientError> {
        let body = StopBody {
            user: self.resolve_user(user),
            session_id,
        };
        info!("Stopping task {}", task_id);

        let path = format!("/chat-messages/{task_id}/stop");
        let request =
            self.build_json_request(Operation::StopMessage, Method::POST, &path, &body)?;
        let response = self.send(Operation::StopMessage, request).await?;
        self.read_json(Operation::StopMessage, response).await
    }

    /// Follow-up questions the app suggests after `message_id`
    pub async fn get_suggested_questions(
        &self,
        message_id: &str,
        user: &str,
        session_id: &str,
    ) -> Result<Vec<String>, ClientError> {
        let path = format!("/messages/{message_id}/suggested");
        let request = self
            .build_request(Operation::SuggestedQuestions, Method::GET, &path)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[("user", self.resolve_user(user)), ("session_id", session_id)]);

        let response = self.send(Operation::SuggestedQuestions, request).await?;
        let questions: SuggestedQuestions =
            self.read_json(Operation::SuggestedQuestions, response).await?;
        let questions = questions.into_vec();
        info!(
            "Got {} suggested questions for {}",
            questions.len(),
            message_id
        );
        Ok(questions)
    }

    /// Rate a message; `None` revokes an earlier rating
    ///
    /// An empty `session_id` is replaced by `session-<unix millis>`.
    pub async fn feedback_message(
        &self,
        message_id: &str,
        rating: Option<Rating>,
        user: &str,
        content: &str,
        session_id: &str,
    ) -> Result<Ack, ClientError> {
        let session_id = if session_id.is_empty() {
            format!("session-{}", chrono::Utc::now().timestamp_millis())
        } else {
            session_id.to_string()
        };
        let body = FeedbackBody {
            rating,
            user: self.resolve_user(user),
            content,
            session_id: &session_id,
        };
        info!("Sending feedback {:?} for {}", rating, message_id);

        let path = format!("/messages/{message_id}/feedbacks");
        let request = self.build_json_request(Operation::Feedback, Method::POST, &path, &body)?;
        let response = self.send(Operation::Feedback, request).await?;
        self.read_json(Operation::Feedback, response).await
    }
}
