//! Subcommand implementations

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use difychat_core::api::{ChatRequest, FileAttachment, FileUpload, Rating, StreamEvent};
use difychat_core::{ChatSession, ClientError, Locale};

/// Dify expects a file `type`; the chat apps we target accept images
const ATTACHMENT_KIND: &str = "image";

fn explain(locale: Locale) -> impl Fn(ClientError) -> anyhow::Error {
    move |err| anyhow!(err.user_message(locale))
}

pub fn build_chat_request(
    query: String,
    conversation: Option<String>,
    blocking: bool,
    inputs: Vec<(String, String)>,
    file_urls: Vec<String>,
    file_ids: Vec<String>,
) -> ChatRequest {
    let mut request = ChatRequest::new(query);
    if let Some(conversation) = conversation {
        request = request.with_conversation(conversation);
    }
    if blocking {
        request = request.blocking();
    }
    for (key, raw) in inputs {
        // Numbers and booleans pass through as JSON, everything else as text
        let value = serde_json::from_str::<Value>(&raw)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or(Value::String(raw));
        request = request.with_input(key, value);
    }
    for url in file_urls {
        request = request.with_file(FileAttachment::remote(ATTACHMENT_KIND, url));
    }
    for id in file_ids {
        request = request.with_file(FileAttachment::uploaded(ATTACHMENT_KIND, id));
    }
    request
}

pub async fn chat(session: &ChatSession, request: ChatRequest, locale: Locale) -> Result<()> {
    if !request.is_streaming() {
        let result = session
            .blocking_chat(request)
            .await
            .map_err(explain(locale))?;
        println!("{}", result.answer);
        eprintln!(
            "conversation: {}  message: {}",
            result.conversation_id, result.message_id
        );
        return Ok(());
    }

    // The server only honors a stop sent for the same user as the chat
    let request_user = request.user.clone();
    let mut stream = session
        .stream_chat(request)
        .await
        .map_err(explain(locale))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut task_id: Option<String> = None;
    let mut stdout = std::io::stdout();

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                match &task_id {
                    Some(task_id) => {
                        if let Err(err) = session.stop_chat_message(task_id, &request_user).await {
                            eprintln!("{}", err.user_message(locale));
                        }
                    }
                    None => {
                        session.coordinator().abort_active();
                    }
                }
                continue;
            }
            event = stream.next_event() => event,
        };

        let Some(event) = event else {
            break;
        };
        match event {
            StreamEvent::Message(chunk) => {
                if task_id.is_none() {
                    task_id = chunk.task_id.clone();
                }
                print!("{}", chunk.content);
                stdout.flush().context("Failed to write answer")?;
            }
            StreamEvent::MessageEnd(end) => {
                println!();
                debug!("Usage: {}", end.metadata);
                eprintln!(
                    "conversation: {}  message: {}",
                    end.conversation_id, end.message_id
                );
            }
            StreamEvent::Error(err) => {
                println!();
                eprintln!("{}", err.message);
            }
            StreamEvent::ReadFailed(err) => {
                println!();
                return Err(explain(locale)(err));
            }
            StreamEvent::Aborted => {
                println!();
                eprintln!("stopped");
            }
        }
    }
    Ok(())
}

pub async fn upload(
    session: &ChatSession,
    path: &Path,
    mime: Option<String>,
    locale: Locale,
) -> Result<()> {
    let mut file = FileUpload::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if let Some(mime) = mime {
        file = file.with_mime_type(mime);
    }
    info!("Uploading {} ({} bytes)", file.file_name, file.bytes.len());

    let uploaded = session.upload_file(file, "").await.map_err(explain(locale))?;
    println!("{}", uploaded.id);
    Ok(())
}

pub async fn stop(session: &ChatSession, task_id: &str, locale: Locale) -> Result<()> {
    let ack = session
        .stop_chat_message(task_id, "")
        .await
        .map_err(explain(locale))?;
    println!("{}", ack.result);
    Ok(())
}

pub async fn suggested(session: &ChatSession, message_id: &str, locale: Locale) -> Result<()> {
    let questions = session
        .get_suggested_questions(message_id, "")
        .await
        .map_err(explain(locale))?;
    for question in questions {
        println!("{question}");
    }
    Ok(())
}

pub async fn feedback(
    session: &ChatSession,
    message_id: &str,
    rating: Option<Rating>,
    content: &str,
    locale: Locale,
) -> Result<()> {
    let ack = session
        .feedback_message(message_id, rating, "", content)
        .await
        .map_err(explain(locale))?;
    println!("{}", ack.result);
    Ok(())
}
