//! Host page: embeds the widget as a child process.
//!
//! DESIGN
//! ======
//! The host launches `aida widget`, mounts a `HostWidget` for it and drives
//! both from one `select!` loop:
//! - console lines → widget handle commands, page events, or chat requests
//! - handle commands → host state machine
//! - widget stdout → transcript output and frame control messages
//! - the button reveal timer
//!
//! Effects of the host state machine are printed as page events; messages
//! it posts to the widget are written to the child's stdin.
//!
//! Console input: `:open`, `:close`, `:toggle` (launcher click), `:outside`,
//! `:esc`, `:mic`, `:speak <n>`, `:ask <text>`, `:quit`; any other line is
//! submitted to the widget while it is open.

use std::io::Write;
use std::process::Stdio;

use bridge::embed::EmbedConfig;
use bridge::host::{HostCommand, HostEffect, HostWidget, WidgetHandle, mount};
use bridge::message::{FrameMessage, WidgetRequest, WidgetUpdate, decode_line, encode_line};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{ShellError, read_stdin_lines};
use crate::config::Config;

/// One console line, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    Handle(HostCommand),
    OutsideClick,
    Escape,
    Request(WidgetRequest),
    Quit,
}

#[must_use]
pub fn parse_line(line: &str) -> Option<HostInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Some(HostInput::Request(WidgetRequest::Submit { text: line.to_owned() }));
    };
    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim();
    match name {
        "open" => Some(HostInput::Handle(HostCommand::Open)),
        "close" => Some(HostInput::Handle(HostCommand::Close)),
        "toggle" => Some(HostInput::Handle(HostCommand::Toggle)),
        "outside" => Some(HostInput::OutsideClick),
        "esc" => Some(HostInput::Escape),
        "mic" => Some(HostInput::Request(WidgetRequest::ToggleMic)),
        "speak" => arg.parse().ok().map(|index| HostInput::Request(WidgetRequest::Speak { index })),
        "ask" if !arg.is_empty() => Some(HostInput::Request(WidgetRequest::Ask { text: arg.to_owned() })),
        "quit" => Some(HostInput::Quit),
        _ => None,
    }
}

// =============================================================================
// CONSOLE
// =============================================================================

/// Renders page events and widget output as console text.
pub struct HostConsole<W> {
    out: W,
    reveal_at: Option<Instant>,
    streaming: Option<usize>,
}

impl<W: Write> HostConsole<W> {
    pub fn new(out: W) -> Self {
        Self { out, reveal_at: None, streaming: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Pending button reveal, if any.
    #[must_use]
    pub fn reveal_at(&self) -> Option<Instant> {
        self.reveal_at
    }

    /// Apply one host effect. Returns the request to post when the effect
    /// targets the widget.
    pub fn effect(&mut self, effect: HostEffect, embed: &EmbedConfig) -> Option<WidgetRequest> {
        match effect {
            HostEffect::ShowFrame => self.emit(&format!(
                "[page] widget opened ({} x {}, max-height {})\n",
                embed.width, embed.height, embed.max_height
            )),
            HostEffect::HideFrame => self.emit("[page] widget closed\n"),
            HostEffect::ShowButton => self.emit(&format!(
                "[page] ({}) button shown at {} ({}; z-index: {}), color {}, hover {}\n",
                embed.button_text,
                embed.position,
                embed.dock(),
                embed.z_index,
                embed.button_color,
                embed.button_hover_color
            )),
            HostEffect::HideButton => self.emit("[page] button hidden\n"),
            HostEffect::ScheduleButtonReveal(delay) => self.reveal_at = Some(Instant::now() + delay),
            HostEffect::ShowNotification => self.emit("[page] ● new message\n"),
            HostEffect::HideNotification => self.emit("[page] notification cleared\n"),
            HostEffect::PostToWidget(message) => return Some(WidgetRequest::Frame { message }),
        }
        None
    }

    /// The reveal timer fired.
    pub fn reveal_fired(&mut self) {
        self.reveal_at = None;
    }

    /// Show widget output. Frame messages are returned for the host state
    /// machine instead of being printed.
    pub fn update(&mut self, update: WidgetUpdate) -> Option<FrameMessage> {
        match update {
            WidgetUpdate::Turn { turn } if turn.html.is_none() && turn.content.is_empty() => {
                self.streaming = Some(turn.index);
                self.emit(&format!("[{}] {}: ", turn.index, turn.role));
            }
            WidgetUpdate::Turn { turn } if self.streaming == Some(turn.index) => {}
            WidgetUpdate::Turn { turn } => self.emit(&format!("[{}] {}: {}\n", turn.index, turn.role, turn.content)),
            WidgetUpdate::Chunk { text, .. } => self.emit(&text),
            WidgetUpdate::Status { phase, .. } => {
                if phase == "idle" && self.streaming.take().is_some() {
                    self.emit("\n");
                }
            }
            WidgetUpdate::Frame { message } => return Some(message),
        }
        None
    }

    fn emit(&mut self, text: &str) {
        let result = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush());
        if let Err(e) = result {
            warn!(error = %e, "host: write failed");
        }
    }
}

// =============================================================================
// RUN
// =============================================================================

async fn post(stdin: &mut ChildStdin, request: &WidgetRequest) -> Result<(), ShellError> {
    let mut line = encode_line(request)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn apply<W: Write>(
    console: &mut HostConsole<W>,
    widget: &HostWidget,
    stdin: &mut ChildStdin,
    effects: Vec<HostEffect>,
) -> Result<(), ShellError> {
    for effect in effects {
        if let Some(request) = console.effect(effect, widget.config()) {
            post(stdin, &request).await?;
        }
    }
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Launch the widget process and run the host page until `:quit`, end of
/// input, or the widget exiting.
///
/// # Errors
///
/// Returns an error if the widget process cannot be started or its pipes fail.
pub async fn run(config: &Config, embed: EmbedConfig) -> Result<(), ShellError> {
    let exe = std::env::current_exe()?;
    let mut child = tokio::process::Command::new(exe)
        .args(["--api-base", &config.api_base, "widget"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;
    let mut stdin = child.stdin.take().ok_or(ShellError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(ShellError::MissingPipe("stdout"))?;
    let mut widget_lines = BufReader::new(stdout).lines();
    info!(url = %embed.widget_url, "host: widget launched");

    let (mut widget, handle, mut host_commands) = mount(embed);
    let origin = widget.config().widget_origin();
    let mut console = HostConsole::new(std::io::stdout());
    let mut input = read_stdin_lines(parse_line);
    let effects = widget.start();
    apply(&mut console, &widget, &mut stdin, effects).await?;

    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else { break };
                match line {
                    HostInput::Quit => break,
                    HostInput::Handle(command) => send_command(&handle, command),
                    HostInput::OutsideClick => {
                        let effects = widget.outside_click();
                        apply(&mut console, &widget, &mut stdin, effects).await?;
                    }
                    HostInput::Escape => {
                        let effects = widget.escape();
                        apply(&mut console, &widget, &mut stdin, effects).await?;
                    }
                    HostInput::Request(request) if widget.is_open() => post(&mut stdin, &request).await?,
                    HostInput::Request(_) => console.emit("[page] widget is closed, :open it first\n"),
                }
            }
            Some(command) = host_commands.recv() => {
                let effects = widget.apply(command);
                apply(&mut console, &widget, &mut stdin, effects).await?;
            }
            line = widget_lines.next_line() => {
                let Some(line) = line? else {
                    warn!("host: widget exited");
                    break;
                };
                match decode_line::<WidgetUpdate>(&line) {
                    Ok(update) => {
                        if let Some(message) = console.update(update) {
                            let effects = widget.receive(&origin, message);
                            apply(&mut console, &widget, &mut stdin, effects).await?;
                        }
                    }
                    Err(e) => warn!(error = %e, "host: bad widget line"),
                }
            }
            () = sleep_until(console.reveal_at()) => {
                console.reveal_fired();
                let effects = widget.button_reveal_due();
                apply(&mut console, &widget, &mut stdin, effects).await?;
            }
        }
    }

    drop(stdin);
    let status = child.wait().await?;
    info!(%status, "host: widget stopped");
    Ok(())
}

fn send_command(handle: &WidgetHandle, command: HostCommand) {
    let sent = match command {
        HostCommand::Open => handle.open(),
        HostCommand::Close => handle.close(),
        HostCommand::Toggle => handle.toggle(),
    };
    if !sent {
        warn!(?command, "host: widget handle closed");
    }
}

#[cfg(test)]
#[path = "host_test.rs"]
mod host_test;
