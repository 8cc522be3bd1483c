//! HTTP client for the Dify chat app API
//!
//! One request per call, no retries. Failures are classified into
//! [`crate::ClientError`] so callers can tell a missing key from a dead network
//! from a rejected request.

mod chat;
mod core;
mod files;
mod messages;


pub use self::chat::ChatResponse;
pub use self::core::{DifyClient, Operation};
