//! Chat response stream decoding
//!
//! [`ChatEventStream`] turns a response body into ordered [`StreamEvent`]s on
//! demand. [`drive_stream`] pushes the same events into a [`StreamHandler`] for
//! callers that prefer callbacks.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sse::{parse_frame, FrameBuffer};
use super::streaming::{MessageChunk, StreamEnd, StreamError, StreamEvent};
use super::thinking::ThinkingRewriter;
use crate::error::ClientError;
use crate::session::StreamBinding;

/// Response body as a stream of chunks, read errors already classified
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Adapt a reqwest response body
pub fn response_body(response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| ClientError::from_stream_read(&e)))
        .boxed()
}

/// Pull-based decoder over one chat response
///
/// Cancellation is checked before every read, while a read is pending, and
/// before every buffered frame. Once cancelled the stream yields a single
/// [`StreamEvent::Aborted`] and ends.
pub struct ChatEventStream {
    body: ByteStream,
    frames: FrameBuffer,
    pending: VecDeque<String>,
    cancel: CancellationToken,
    binding: Option<StreamBinding>,
    thinking: Option<ThinkingRewriter>,
    finished: bool,
    stream_start: Instant,
    event_count: usize,
    bytes_received: usize,
}

impl ChatEventStream {
    pub fn new(body: ByteStream, cancel: CancellationToken) -> Self {
        debug!("Chat event stream created");
        Self {
            body,
            frames: FrameBuffer::new(),
            pending: VecDeque::new(),
            cancel,
            binding: None,
            thinking: None,
            finished: false,
            stream_start: Instant::now(),
            event_count: 0,
            bytes_received: 0,
        }
    }

    /// Release `binding` when this stream finishes (or is dropped)
    pub fn with_binding(mut self, binding: StreamBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Enable the collapsible "Thinking..." rewrite of message content
    pub fn with_thinking_rewrite(mut self, enabled: bool) -> Self {
        self.thinking = enabled.then(ThinkingRewriter::new);
        self
    }

    /// Token that aborts this stream
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether no more events will be produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next event, or `None` once the stream is over
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if self.finished {
                return None;
            }

            if self.cancel.is_cancelled() {
                info!(
                    "Stream aborted after {:?}, {} events, {} bytes",
                    self.stream_start.elapsed(),
                    self.event_count,
                    self.bytes_received
                );
                self.finish();
                return Some(StreamEvent::Aborted);
            }

            if let Some(frame) = self.pending.pop_front() {
                if let Some(event) = self.decode_frame(&frame) {
                    return Some(event);
                }
                continue;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => continue,
                next = self.body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    self.bytes_received += bytes.len();
                    debug!(
                        "SSE chunk received: {} bytes (total: {} bytes)",
                        bytes.len(),
                        self.bytes_received
                    );
                    self.pending.extend(self.frames.push(&bytes));
                }
                Some(Err(err)) => {
                    warn!(
                        "Stream read failed after {:?}, {} events: {}",
                        self.stream_start.elapsed(),
                        self.event_count,
                        err
                    );
                    self.finish();
                    return Some(StreamEvent::ReadFailed(err));
                }
                None => {
                    if !self.frames.is_empty() {
                        debug!(
                            "Discarding unterminated trailing data: {} chars",
                            self.frames.remainder().len()
                        );
                    }
                    info!(
                        "Stream ended after {:?}, {} events, {} bytes",
                        self.stream_start.elapsed(),
                        self.event_count,
                        self.bytes_received
                    );
                    self.finish();
                    return None;
                }
            }
        }
    }

    /// Consume into a `futures::Stream` of events
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_event().await.map(|event| (event, stream))
        })
    }

    fn decode_frame(&mut self, frame: &str) -> Option<StreamEvent> {
        let event = match parse_frame(frame) {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to parse SSE frame: {} ({})", err, frame);
                return None;
            }
        };

        self.event_count += 1;
        let event = match event {
            StreamEvent::Message(chunk) => StreamEvent::Message(self.rewrite(chunk)),
            StreamEvent::MessageEnd(end) => {
                info!(
                    "SSE message_end: message={} after {:?} ({} events)",
                    end.message_id,
                    self.stream_start.elapsed(),
                    self.event_count
                );
                // The answer is complete; a later stop must not target this stream
                self.binding = None;
                StreamEvent::MessageEnd(end)
            }
            StreamEvent::Error(err) => {
                warn!("SSE error event: {} ({:?})", err.message, err.code);
                StreamEvent::Error(err)
            }
            other => other,
        };
        Some(event)
    }

    fn rewrite(&mut self, mut chunk: MessageChunk) -> MessageChunk {
        if let Some(thinking) = self.thinking.as_mut() {
            let rewritten = thinking.rewrite(&chunk.content).into_owned();
            chunk.content = rewritten;
        }
        chunk
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pending.clear();
        self.binding = None;
    }
}

/// Callback interface for a chat stream
///
/// Callbacks run in arrival order on the task driving the stream.
pub trait StreamHandler {
    /// An answer fragment arrived
    fn on_message(&mut self, _chunk: MessageChunk) {}

    /// The server reported an error, or reading the body failed
    fn on_error(&mut self, _error: StreamError) {}

    /// The answer completed, or the stream was aborted
    fn on_end(&mut self, _end: StreamEnd) {}
}

/// Feed every event of `stream` to `handler` until the stream ends
pub async fn drive_stream<H>(mut stream: ChatEventStream, handler: &mut H)
where
    H: StreamHandler + ?Sized,
{
    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Message(chunk) => handler.on_message(chunk),
            StreamEvent::MessageEnd(end) => handler.on_end(StreamEnd::Completed(end)),
            StreamEvent::Error(err) => handler.on_error(StreamError::Server(err)),
            StreamEvent::ReadFailed(err) => handler.on_error(StreamError::Transport(err)),
            StreamEvent::Aborted => handler.on_end(StreamEnd::Aborted),
        }
    }
}

type Callback<'a, T> = Box<dyn FnMut(T) + Send + 'a>;

/// [`StreamHandler`] built from closures; unset callbacks are skipped
#[derive(Default)]
pub struct StreamCallbacks<'a> {
    on_message: Option<Callback<'a, MessageChunk>>,
    on_error: Option<Callback<'a, StreamError>>,
    on_end: Option<Callback<'a, StreamEnd>>,
}

impl<'a> StreamCallbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, f: impl FnMut(MessageChunk) + Send + 'a) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(StreamError) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_end(mut self, f: impl FnMut(StreamEnd) + Send + 'a) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }
}

impl StreamHandler for StreamCallbacks<'_> {
    fn on_message(&mut self, chunk: MessageChunk) {
        if let Some(f) = self.on_message.as_mut() {
            f(chunk);
        }
    }

    fn on_error(&mut self, error: StreamError) {
        if let Some(f) = self.on_error.as_mut() {
            f(error);
        }
    }

    fn on_end(&mut self, end: StreamEnd) {
        if let Some(f) = self.on_end.as_mut() {
            f(end);
        }
    }
}
