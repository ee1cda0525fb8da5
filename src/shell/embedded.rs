//! Embedded widget: the chat widget as a child process speaking JSON lines.
//!
//! DESIGN
//! ======
//! Stdin carries one `WidgetRequest` per line, stdout one `WidgetUpdate` per
//! line. Logs go to stderr so they never corrupt the stream.
//!
//! Frame control is answered without involving the controller: `close` from
//! the embedder is acknowledged with `close_chat` (the conversation survives,
//! only the frame hides), and every completed answer emits `new_message` so
//! the host can flag it while hidden.

use std::io::Write;

use bridge::message::{FrameMessage, TurnPayload, WidgetRequest, WidgetUpdate, decode_line, encode_line};
use tracing::{debug, warn};

use super::read_stdin_lines;
use crate::controller::{ChatController, ChatView, Command, Status};
use crate::conversation::Turn;

/// Where an inbound request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command(Command),
    /// Answer the embedder directly.
    Reply(WidgetUpdate),
    Ignore,
}

#[must_use]
pub fn route(request: WidgetRequest) -> Route {
    match request {
        WidgetRequest::Submit { text } => Route::Command(Command::Submit(text)),
        WidgetRequest::Ask { text } => Route::Command(Command::Ask(text)),
        WidgetRequest::ToggleMic => Route::Command(Command::ToggleMic),
        WidgetRequest::Speak { index } => Route::Command(Command::Speak(index)),
        WidgetRequest::Frame { message: FrameMessage::Close } => {
            Route::Reply(WidgetUpdate::Frame { message: FrameMessage::CloseChat })
        }
        // Widget → host messages echoed back carry nothing for us.
        WidgetRequest::Frame { message } => {
            debug!(message = message.legacy_name(), "widget: ignoring frame message");
            Route::Ignore
        }
    }
}

/// Write one update as a JSON line.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_update<W: Write>(out: &mut W, update: &WidgetUpdate) -> Result<(), super::ShellError> {
    let line = encode_line(update)?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

fn turn_payload(index: usize, turn: &Turn) -> TurnPayload {
    TurnPayload {
        index,
        role: turn.role.as_str().to_owned(),
        content: turn.content.clone(),
        html: turn.html.clone(),
    }
}

/// Mirrors the controller onto a JSON-lines writer.
pub struct JsonLinesView<W> {
    out: W,
}

impl<W: Write> JsonLinesView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn send(&mut self, update: &WidgetUpdate) {
        if let Err(e) = write_update(&mut self.out, update) {
            warn!(error = %e, "widget: update write failed");
        }
    }
}

impl<W: Write> ChatView for JsonLinesView<W> {
    fn turn_appended(&mut self, index: usize, turn: &Turn) {
        self.send(&WidgetUpdate::Turn { turn: turn_payload(index, turn) });
    }

    fn chunk_appended(&mut self, index: usize, chunk: &str) {
        self.send(&WidgetUpdate::Chunk { index, text: chunk.to_owned() });
    }

    fn turn_rendered(&mut self, index: usize, turn: &Turn) {
        self.send(&WidgetUpdate::Turn { turn: turn_payload(index, turn) });
    }

    fn status_changed(&mut self, status: &Status) {
        self.send(&WidgetUpdate::Status {
            phase: status.phase.as_str().to_owned(),
            pending: status.pending,
            recording: status.recording,
            speaking: status.speaking,
        });
    }

    fn answer_completed(&mut self, _index: usize) {
        self.send(&WidgetUpdate::Frame { message: FrameMessage::NewMessage });
    }
}

/// Parse one stdin line; replies are written straight to stdout.
fn handle_line(line: &str) -> Option<Command> {
    let request = match decode_line::<WidgetRequest>(line) {
        Ok(request) => request,
        Err(bridge::message::CodecError::Empty) => return None,
        Err(e) => {
            warn!(error = %e, "widget: bad request line");
            return None;
        }
    };
    match route(request) {
        Route::Command(command) => Some(command),
        Route::Reply(update) => {
            if let Err(e) = write_update(&mut std::io::stdout().lock(), &update) {
                warn!(error = %e, "widget: reply write failed");
            }
            None
        }
        Route::Ignore => None,
    }
}

/// Serve the widget protocol on stdio until stdin closes.
pub async fn run(mut controller: ChatController) {
    let commands = read_stdin_lines(handle_line);
    let mut view = JsonLinesView::new(std::io::stdout());
    controller.run(commands, &mut view).await;
}

#[cfg(test)]
#[path = "embedded_test.rs"]
mod embedded_test;
