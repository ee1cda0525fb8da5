//! API types: wire bodies for the backend endpoints and the client error.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by backend calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request could not be sent or the connection failed.
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: &'static str, message: String },

    /// The backend returned a non-success HTTP status.
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: &'static str, status: u16, body: String },

    /// The response body could not be decoded.
    #[error("{endpoint} response parse failed: {message}")]
    Parse { endpoint: &'static str, message: String },

    /// The event stream broke after it was opened.
    #[error("event stream failed: {0}")]
    Stream(String),
}

impl ApiError {
    pub(crate) fn request(endpoint: &'static str, err: &reqwest::Error) -> Self {
        Self::Request { endpoint, message: err.to_string() }
    }

    pub(crate) fn parse(endpoint: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Parse { endpoint, message: err.to_string() }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Response of `POST /chat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Placeholder shown when `/chat` answers without text.
pub const NO_ANSWER: &str = "[no answer]";

impl ChatReply {
    /// Answer text, or [`NO_ANSWER`] when missing or empty.
    #[must_use]
    pub fn answer_or_placeholder(&self) -> &str {
        match self.answer.as_deref() {
            Some(answer) if !answer.is_empty() => answer,
            _ => NO_ANSWER,
        }
    }
}

/// Response of `POST /stt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: Option<String>,
}

impl Transcript {
    /// Trimmed transcription, `None` when absent or blank.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Body of `POST /tts`.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
}
