//! Host ↔ widget bridge for the embeddable AIDA assistant.
//!
//! This crate owns everything that crosses the embedding boundary: the
//! control messages exchanged between the host page and the widget frame,
//! the JSON-lines envelope used when the widget runs as a child process,
//! the embed configuration read from `data-*` attributes, and the host-side
//! open/close state machine with its explicit [`WidgetHandle`].
//!
//! The widget core (`aida`) and the host shell both depend on this crate so
//! the contract lives in one place.

pub mod embed;
pub mod host;
pub mod message;

pub use embed::{EmbedConfig, EmbedError, Position};
pub use host::{HostCommand, HostEffect, HostWidget, WidgetHandle, mount};
pub use message::{FrameMessage, TurnPayload, WidgetRequest, WidgetUpdate, decode_line, encode_line};
