//! API — HTTP and SSE access to the AIDA backend.
//!
//! DESIGN
//! ======
//! `ApiClient` is a thin reqwest wrapper over the four backend endpoints.
//! The controller never sees it directly: it talks to a `ChatBackend` trait
//! object, so conversation logic can be driven by a fake backend in tests.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `ApiError`. Callers log and move on; nothing here
//! retries.

pub mod client;
pub mod sse;
pub mod types;

pub use client::ApiClient;
pub use sse::{ChatStream, ChatStreamEvent};
pub use types::{ApiError, ChatReply};

use crate::audio::AudioClip;

/// Operations the conversation controller needs from the backend.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// One-shot question; `POST /chat`.
    async fn chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatReply, ApiError>;

    /// Open an incremental answer stream; `GET /chat/stream`.
    async fn stream_chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatStream, ApiError>;

    /// Speech to text; `POST /stt`. `Ok(None)` when nothing was recognized.
    async fn transcribe(&self, clip: AudioClip) -> Result<Option<String>, ApiError>;

    /// Text to speech; `POST /tts`. Returns the encoded audio body.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError>;
}
