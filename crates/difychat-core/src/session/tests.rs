use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::api::{StreamCallbacks, StreamEnd, StreamEvent};

const SSE_BODY: &str = concat!(
    "data: {\"event\":\"message\",\"answer\":\"Hi\",\"message_id\":\"m1\",\"conversation_id\":\"c1\",\"task_id\":\"t1\"}\n\n",
    "data: {\"event\":\"ping\"}\n\n",
    "data: {\"event\":\"message\",\"answer\":\" there\",\"message_id\":\"m1\",\"conversation_id\":\"c1\",\"task_id\":\"t1\"}\n\n",
    "data: {\"event\":\"message_end\",\"message_id\":\"m1\",\"conversation_id\":\"c1\",\"metadata\":{\"usage\":{\"total_tokens\":7}}}\n\n"
);

fn session_for(server: &MockServer) -> ChatSession {
    let session = ChatSession::new(ClientConfig::new(server.uri())).unwrap();
    session.set_api_key("app-key");
    session
}

async fn mount_stop(server: &MockServer, task_id: &str, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/chat-messages/{task_id}/stop")))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"result": "success"})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_chat_delivers_callbacks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .and(body_partial_json(json!({
            "query": "hello",
            "user": "alice",
            "session_id": "s1",
            "response_mode": "streaming"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server).with_user("alice").with_session_id("s1");

    let log = parking_lot::Mutex::new(Vec::new());
    let mut handler = StreamCallbacks::new()
        .on_message(|chunk| log.lock().push(format!("message:{}", chunk.content)))
        .on_error(|err| log.lock().push(format!("error:{}", err.message())))
        .on_end(|end| match end {
            StreamEnd::Completed(end) => log.lock().push(format!(
                "end:{}:{}",
                end.message_id, end.metadata["usage"]["total_tokens"]
            )),
            StreamEnd::Aborted => log.lock().push("aborted".to_string()),
        });
    session
        .chat(ChatRequest::new("hello"), &mut handler)
        .await
        .unwrap();
    drop(handler);

    assert_eq!(
        log.into_inner(),
        vec!["message:Hi", "message: there", "end:m1:7"]
    );
    assert!(!session.coordinator().is_active());
}

#[tokio::test]
async fn test_handle_stream_response_after_send() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let session = session_for(&server);
    let ChatResponse::Streaming(response) = session
        .send_chat_message(ChatRequest::new("hello"))
        .await
        .unwrap()
    else {
        panic!("expected a streaming response");
    };

    let mut answer = String::new();
    let mut completed = false;
    let mut handler = StreamCallbacks::new()
        .on_message(|chunk| answer.push_str(&chunk.content))
        .on_end(|end| completed = !end.is_aborted());
    session.handle_stream_response(response, &mut handler).await;
    drop(handler);

    assert_eq!(answer, "Hi there");
    assert!(completed);
}

#[tokio::test]
async fn test_stream_chat_pull_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .mount(&server)
        .await;

    let session = session_for(&server);
    let mut stream = session.stream_chat(ChatRequest::new("hello")).await.unwrap();
    assert!(session.coordinator().is_active());

    let first = stream.next_event().await.unwrap();
    let StreamEvent::Message(chunk) = first else {
        panic!("expected a message, got {:?}", first);
    };
    assert_eq!(chunk.task_id.as_deref(), Some("t1"));

    let rest: Vec<StreamEvent> = stream.into_stream().collect().await;
    assert_eq!(rest.len(), 2);
    assert!(matches!(rest[1], StreamEvent::MessageEnd(_)));
    assert!(!session.coordinator().is_active());
}

#[tokio::test]
async fn test_blocking_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .and(body_partial_json(json!({"response_mode": "blocking", "user": "default_user"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "42",
            "message_id": "m2",
            "conversation_id": "c2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let result = session.blocking_chat(ChatRequest::new("answer?")).await.unwrap();
    assert_eq!(result.answer, "42");
    assert!(!session.coordinator().is_active());
}

#[tokio::test]
async fn test_stop_without_local_stream_still_calls_server() {
    let server = MockServer::start().await;
    mount_stop(&server, "t9", 200, 1).await;

    let session = session_for(&server);
    assert!(!session.coordinator().is_active());

    let ack = session.stop_chat_message("t9", "").await.unwrap();
    assert!(ack.is_success());
}

#[tokio::test]
async fn test_stop_aborts_active_stream_and_calls_server() {
    let server = MockServer::start().await;
    mount_stop(&server, "t1", 200, 1).await;

    let session = session_for(&server);
    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, ClientError>>();
    let mut stream = session.bind_stream(UnboundedReceiverStream::new(rx).boxed());

    tx.send(Ok(Bytes::from(
        "data: {\"event\":\"message\",\"answer\":\"Hi\",\"message_id\":\"m1\",\"conversation_id\":\"c1\",\"task_id\":\"t1\"}\n\n",
    )))
    .unwrap();
    let StreamEvent::Message(chunk) = stream.next_event().await.unwrap() else {
        panic!("expected a message");
    };
    let task_id = chunk.task_id.unwrap();

    // Stop from an independent task while the stream waits for more bytes
    let stopper = {
        let session = session.clone();
        tokio::spawn(async move { session.stop_chat_message(&task_id, "").await })
    };

    assert_eq!(stream.next_event().await, Some(StreamEvent::Aborted));
    assert_eq!(stream.next_event().await, None);
    assert!(stopper.await.unwrap().unwrap().is_success());
    assert!(!session.coordinator().is_active());

    // Bytes sent after the abort are never surfaced
    let _ = tx.send(Ok(Bytes::from("data: {\"event\":\"message_end\"}\n\n")));
    assert_eq!(stream.next_event().await, None);
}

#[tokio::test]
async fn test_stop_aborts_locally_even_when_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages/t1/stop"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "internal"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let (_tx, rx) = mpsc::unbounded_channel::<Result<Bytes, ClientError>>();
    let mut stream = session.bind_stream(UnboundedReceiverStream::new(rx).boxed());

    let err = session.stop_chat_message("t1", "").await.unwrap_err();
    assert_eq!(
        err,
        ClientError::RequestFailed {
            status: Some(500),
            message: "internal".to_string(),
        }
    );
    assert_eq!(stream.next_event().await, Some(StreamEvent::Aborted));
}

#[tokio::test]
async fn test_stop_without_key_still_aborts_locally() {
    let server = MockServer::start().await;
    mount_stop(&server, "t1", 200, 0).await;

    let session = ChatSession::new(ClientConfig::new(server.uri())).unwrap();
    let (_tx, rx) = mpsc::unbounded_channel::<Result<Bytes, ClientError>>();
    let mut stream = session.bind_stream(UnboundedReceiverStream::new(rx).boxed());

    let err = session.stop_chat_message("t1", "").await.unwrap_err();
    assert_eq!(err, ClientError::CredentialMissing);
    assert_eq!(stream.next_event().await, Some(StreamEvent::Aborted));
}

#[tokio::test]
async fn test_thinking_rewrite_follows_config() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"event\":\"message\",\"answer\":\"<think>\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n",
        "data: {\"event\":\"message\",\"answer\":\"</think>\",\"message_id\":\"m1\",\"conversation_id\":\"c1\"}\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let config = ClientConfig {
        rewrite_thinking: true,
        ..ClientConfig::new(server.uri())
    };
    let session = ChatSession::new(config).unwrap();

    let mut contents = Vec::new();
    let mut handler = StreamCallbacks::new().on_message(|chunk| contents.push(chunk.content));
    session
        .chat(ChatRequest::new("think hard"), &mut handler)
        .await
        .unwrap();
    drop(handler);

    assert_eq!(contents.len(), 2);
    assert!(contents[0].starts_with("<details"));
    assert_eq!(contents[1], "</details>");
}

#[tokio::test]
async fn test_chat_request_failure_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "invalid_param",
            "message": "query is required"
        })))
        .mount(&server)
        .await;

    let session = session_for(&server);
    let mut called = false;
    let mut handler = StreamCallbacks::new().on_error(|_| called = true);
    let err = session
        .chat(ChatRequest::new(""), &mut handler)
        .await
        .unwrap_err();
    drop(handler);

    assert_eq!(err.user_message(crate::config::Locale::English), "query is required");
    assert!(!called);
    assert!(!session.coordinator().is_active());
}

#[tokio::test]
async fn test_stop_uses_user_of_the_chat_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-messages"))
        .and(body_partial_json(json!({"user": "bob"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat-messages/t1/stop"))
        .and(body_partial_json(json!({"user": "bob"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    assert_eq!(session.user(), "default_user");

    let mut stream = session
        .stream_chat(ChatRequest::new("hello").with_user("bob"))
        .await
        .unwrap();
    let StreamEvent::Message(chunk) = stream.next_event().await.unwrap() else {
        panic!("expected a message");
    };
    let task_id = chunk.task_id.unwrap();

    let ack = session.stop_chat_message(&task_id, "bob").await.unwrap();
    assert!(ack.is_success());
    assert_eq!(stream.next_event().await, Some(StreamEvent::Aborted));
}

#[tokio::test]
async fn test_blank_user_falls_back_to_session_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages/m1/suggested"))
        .and(query_param("user", "alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": ["Why?"]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/m1/feedbacks"))
        .and(body_partial_json(json!({"user": "carol", "rating": "like"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server).with_user("alice");
    let questions = session.get_suggested_questions("m1", " ").await.unwrap();
    assert_eq!(questions, vec!["Why?"]);

    let ack = session
        .feedback_message("m1", Some(Rating::Like), "carol", "")
        .await
        .unwrap();
    assert!(ack.is_success());
}
