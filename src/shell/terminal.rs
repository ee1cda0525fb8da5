//! Terminal page: chat with AIDA from a plain terminal.
//!
//! Plain lines are submitted through the streaming path. Slash commands:
//! `/ask <text>`, `/mic`, `/speak <n>`, `/quit`.

use std::io::Write;

use tracing::warn;

use super::read_stdin_lines;
use crate::controller::{ChatController, ChatView, Command, Phase, Status};
use crate::conversation::{Role, Turn};

pub const HELP: &str = "Type a question and press Enter. /ask <text> one-shot, /mic record, /speak <n> read turn n aloud, /quit exit.";

/// Map one input line to a controller command. Blank lines map to nothing.
#[must_use]
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Submit(line.to_owned()));
    };
    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim();
    match name {
        "quit" | "exit" => Some(Command::Close),
        "mic" => Some(Command::ToggleMic),
        "ask" if !arg.is_empty() => Some(Command::Ask(arg.to_owned())),
        "speak" => arg.parse().ok().map(Command::Speak),
        _ => None,
    }
}

/// Prints the conversation as a running transcript.
pub struct TerminalView<W> {
    out: W,
    streaming: Option<usize>,
    last: Option<Status>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out, streaming: None, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let result = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush());
        if let Err(e) = result {
            warn!(error = %e, "terminal: write failed");
        }
    }
}

impl<W: Write> ChatView for TerminalView<W> {
    fn turn_appended(&mut self, index: usize, turn: &Turn) {
        match turn.role {
            Role::User => self.emit(&format!("[{index}] you: {}\n", turn.content)),
            Role::Ai if turn.content.is_empty() => {
                self.streaming = Some(index);
                self.emit(&format!("[{index}] aida: "));
            }
            Role::Ai => self.emit(&format!("[{index}] aida: {}\n", turn.content)),
        }
    }

    fn chunk_appended(&mut self, _index: usize, chunk: &str) {
        self.emit(chunk);
    }

    fn turn_rendered(&mut self, _index: usize, _turn: &Turn) {}

    fn status_changed(&mut self, status: &Status) {
        let previous = self.last.replace(*status);
        if status.phase == Phase::Idle && self.streaming.take().is_some() {
            self.emit("\n");
        }
        let Some(previous) = previous else { return };
        if status.recording != previous.recording {
            self.emit(if status.recording { "(recording, /mic to stop)\n" } else { "(recording stopped)\n" });
        }
        if status.speaking != previous.speaking {
            match status.speaking {
                Some(index) => self.emit(&format!("(speaking turn {index})\n")),
                None => self.emit("(playback stopped)\n"),
            }
        }
    }

    fn answer_completed(&mut self, _index: usize) {}
}

/// Run the terminal page until `/quit` or end of input.
pub async fn run(mut controller: ChatController) {
    let commands = read_stdin_lines(parse_line);
    let mut view = TerminalView::new(std::io::stdout());
    view.emit(&format!("{HELP}\n"));
    controller.run(commands, &mut view).await;
}

#[cfg(test)]
#[path = "terminal_test.rs"]
mod terminal_test;
