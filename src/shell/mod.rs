//! Shells — thin presentation layers over the chat controller.
//!
//! DESIGN
//! ======
//! Every shell owns a `ChatView` and feeds `Command`s into the controller.
//! - `terminal`: a line-oriented chat page on the user's terminal
//! - `embedded`: the widget itself, speaking JSON lines over stdio
//! - `host`: an embedding page that launches `embedded` as a child process
//!   and drives it through the bridge host state machine
//!
//! Stdin is read on a plain thread, not a runtime task, so a blocked read
//! never holds up runtime shutdown.

pub mod embedded;
pub mod host;
pub mod terminal;

use std::io::BufRead;

use tokio::sync::mpsc;

/// Errors that end a shell.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("widget protocol error: {0}")]
    Codec(#[from] bridge::message::CodecError),

    #[error("widget process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Read stdin line by line on a background thread, forwarding whatever
/// `parse` maps each line to. The channel closes at end of input or once the
/// receiver is dropped.
pub(crate) fn read_stdin_lines<T, F>(parse: F) -> mpsc::UnboundedReceiver<T>
where
    T: Send + 'static,
    F: Fn(&str) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "shell: stdin read failed");
                    break;
                }
            };
            if let Some(item) = parse(&line) {
                if tx.send(item).is_err() {
                    break;
                }
            }
        }
        tracing::debug!("shell: stdin closed");
    });
    rx
}
