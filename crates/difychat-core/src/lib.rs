//! difychat core library
//!
//! Client for Dify chat apps:
//! - [`api::DifyClient`]: one HTTP request per operation, classified errors
//! - [`api::ChatEventStream`]: SSE body to ordered [`api::StreamEvent`]s
//! - [`session::CancellationCoordinator`]: stop requests meet the read loop
//! - [`session::ChatSession`]: the facade tying them together

pub mod api;
pub mod config;
pub mod error;
pub mod session;

pub use api::{ChatEventStream, ChatRequest, DifyClient, StreamEvent, StreamHandler};
pub use config::{ClientConfig, Locale};
pub use error::ClientError;
pub use session::{CancellationCoordinator, ChatSession};
