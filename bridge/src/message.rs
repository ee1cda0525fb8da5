//! Cross-frame control messages and the widget JSON-lines envelope.
//!
//! DESIGN
//! ======
//! Control messages used to be bare strings posted between the host page and
//! the widget frame (`"aida-close-chat"` and friends). They are now a tagged
//! enum; the legacy strings are still accepted and produced through
//! [`FrameMessage::from_legacy`] / [`FrameMessage::legacy_name`] so an older
//! embed script keeps working.
//!
//! When the widget runs as a child process the host talks to it with one
//! JSON object per line: [`WidgetRequest`] inbound, [`WidgetUpdate`] outbound.

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;

/// Error returned by [`decode_line`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The line was blank after trimming.
    #[error("empty line")]
    Empty,
    /// The line was not a valid JSON message of the expected shape.
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// FRAME MESSAGES
// =============================================================================

/// Control message exchanged between the host and the widget frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameMessage {
    /// Widget → host: hide the widget frame.
    CloseChat,
    /// Widget → host: an answer arrived; flag it while the frame is hidden.
    NewMessage,
    /// Host → widget: the embedder asked the widget to close itself.
    Close,
}

impl FrameMessage {
    /// Wire string of the string-based `postMessage` protocol.
    #[must_use]
    pub fn legacy_name(self) -> &'static str {
        match self {
            Self::CloseChat => "aida-close-chat",
            Self::NewMessage => "aida-new-message",
            Self::Close => "aida-close",
        }
    }

    /// Parse a legacy `postMessage` string. Unknown strings yield `None`.
    #[must_use]
    pub fn from_legacy(raw: &str) -> Option<Self> {
        match raw.trim() {
            "aida-close-chat" => Some(Self::CloseChat),
            "aida-new-message" => Some(Self::NewMessage),
            "aida-close" => Some(Self::Close),
            _ => None,
        }
    }
}

// =============================================================================
// WIDGET ENVELOPE
// =============================================================================

/// One rendered (or partially rendered) conversation turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPayload {
    pub index: usize,
    /// `"user"` or `"ai"`.
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Host → widget request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetRequest {
    /// Send text through the streaming path.
    Submit { text: String },
    /// Send text through the one-shot request/response path.
    Ask { text: String },
    /// Start or stop microphone capture.
    ToggleMic,
    /// Toggle speech playback for the turn at `index`.
    Speak { index: usize },
    /// A control message from the embedder.
    Frame { message: FrameMessage },
}

/// Widget → host update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetUpdate {
    /// A turn was appended or its HTML was re-rendered.
    Turn { turn: TurnPayload },
    /// Incremental text appended to the streaming turn.
    Chunk { index: usize, text: String },
    /// Controller status after a transition.
    Status {
        phase: String,
        pending: bool,
        recording: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speaking: Option<usize>,
    },
    /// A control message for the embedder.
    Frame { message: FrameMessage },
}

/// Serialize a message as a single JSON line (no trailing newline).
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse one JSON line into a message.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for blank lines and [`CodecError::Json`]
/// for anything that does not match `T`.
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, CodecError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
