//! AIDA: embeddable chat assistant.
//!
//! SYSTEM CONTEXT
//! ==============
//! The assistant talks to a remote backend over HTTP and server-sent events.
//! This crate holds the client side: the API client, the streaming
//! conversation controller, markdown rendering, voice capture and playback,
//! and the shells that present one conversation in a terminal or as an
//! embedded widget. The host ↔ widget contract lives in the `bridge` crate.

pub mod api;
pub mod audio;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod markdown;
pub mod shell;

pub use api::{ApiClient, ApiError, ChatBackend};
pub use config::{Config, ConfigError};
pub use controller::{ChatController, ChatView, Command, Phase, Status};
pub use conversation::{Conversation, Role, Turn};
