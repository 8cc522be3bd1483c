//! Dify chat app API: HTTP client, SSE decoding and stream types

pub mod client;
pub mod sse;
pub mod stream;
pub mod streaming;
pub mod thinking;
pub mod types;

pub use client::{ChatResponse, DifyClient, Operation};
pub use sse::{parse_frame, FrameBuffer};
pub use stream::{
    drive_stream, response_body, ByteStream, ChatEventStream, StreamCallbacks, StreamHandler,
};
pub use streaming::{MessageChunk, MessageEnd, ServerError, StreamEnd, StreamError, StreamEvent};
pub use thinking::ThinkingRewriter;
pub use types::{
    Ack, ChatRequest, ChatResult, FileAttachment, FileUpload, Rating, ResponseMode,
    TransferMethod, UploadedFile,
};
