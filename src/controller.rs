//! Chat controller — the single state machine behind every shell.
//!
//! DESIGN
//! ======
//! One task runs a `select!` loop over:
//! - shell commands (submit, ask, mic toggle, speak, close)
//! - events from the open answer stream
//! - the render debounce deadline
//! - results of spawned backend calls
//! - a clip-finished poll while audio plays
//!
//! Spawned calls own only an `Arc` of the backend and report back over a
//! channel, so every mutation of the conversation happens on this task. The
//! view is told about each change as it happens.
//!
//! LIFECYCLE
//! =========
//! Per exchange: Idle → Sending → Streaming → Rendering → Idle.
//! 1. Submit appends the user turn, sets `pending`, opens the stream
//! 2. Stream open appends an empty assistant turn
//! 3. Chunks append verbatim; the first chunk in a window arms the debounce
//! 4. `done` adopts the session, cancels the debounce, renders, clears `pending`
//!
//! ERROR HANDLING
//! ==============
//! Backend failures are logged and end the exchange. Partial answers stay
//! and are rendered once. Nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ChatBackend, ChatReply, ChatStream, ChatStreamEvent};
use crate::audio::{self, AudioCapture, AudioOutput};
use crate::config::Config;
use crate::conversation::debounce::RenderDebounce;
use crate::conversation::playback::{Playback, PlaybackRequest, Ticket};
use crate::conversation::recorder::{MicToggle, Recorder};
use crate::conversation::{Conversation, Turn};

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;

const CLIP_POLL: Duration = Duration::from_millis(100);

// =============================================================================
// COMMANDS & VIEW
// =============================================================================

/// Input from a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Typed text, streamed answer.
    Submit(String),
    /// Typed text, one-shot answer.
    Ask(String),
    ToggleMic,
    /// Toggle voice playback of a turn.
    Speak(usize),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Rendering,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Rendering => "rendering",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub pending: bool,
    pub recording: bool,
    /// Turn selected for voice playback.
    pub speaking: Option<usize>,
}

/// Presentation surface driven by the controller.
pub trait ChatView {
    fn turn_appended(&mut self, index: usize, turn: &Turn);
    fn chunk_appended(&mut self, index: usize, chunk: &str);
    fn turn_rendered(&mut self, index: usize, turn: &Turn);
    fn status_changed(&mut self, status: &Status);
    /// An assistant answer finished arriving.
    fn answer_completed(&mut self, index: usize);
}

// =============================================================================
// CONTROLLER
// =============================================================================

enum TaskResult {
    StreamOpened(Result<ChatStream, ApiError>),
    Answered(Result<ChatReply, ApiError>),
    Transcribed(Result<Option<String>, ApiError>),
    Synthesized { ticket: Ticket, result: Result<Vec<u8>, ApiError> },
}

struct ActiveStream {
    stream: ChatStream,
    index: usize,
}

pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    conversation: Conversation,
    phase: Phase,
    debounce: RenderDebounce,
    playback: Playback,
    recorder: Recorder,
    output: Box<dyn AudioOutput>,
    stream: Option<ActiveStream>,
    in_flight: usize,
    results_tx: mpsc::UnboundedSender<TaskResult>,
    results_rx: mpsc::UnboundedReceiver<TaskResult>,
}

impl ChatController {
    /// Controller with the best audio devices this build offers.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        Self::with_audio(backend, config, audio::default_capture(), audio::default_output())
    }

    #[must_use]
    pub fn with_audio(
        backend: Arc<dyn ChatBackend>,
        config: &Config,
        capture: Box<dyn AudioCapture>,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            conversation: Conversation::new(config.greeting.as_deref()),
            phase: Phase::Idle,
            debounce: RenderDebounce::new(config.render_debounce),
            playback: Playback::new(),
            recorder: Recorder::new(capture),
            output,
            stream: None,
            in_flight: 0,
            results_tx,
            results_rx,
        }
    }

    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub fn status(&self) -> Status {
        Status {
            phase: self.phase,
            pending: self.conversation.pending(),
            recording: self.recorder.is_recording(),
            speaking: self.playback.speaking(),
        }
    }

    /// Drive the conversation until `Close`, or until the command channel is
    /// closed and no backend call or stream is outstanding.
    pub async fn run<V: ChatView>(&mut self, mut commands: mpsc::UnboundedReceiver<Command>, view: &mut V) {
        for (index, turn) in self.conversation.turns().iter().enumerate() {
            view.turn_appended(index, turn);
        }
        view.status_changed(&self.status());

        let mut commands_open = true;
        loop {
            if !commands_open && self.stream.is_none() && self.in_flight == 0 {
                break;
            }
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Close) => {
                        self.shutdown();
                        break;
                    }
                    Some(command) => self.handle_command(command, view),
                    None => commands_open = false,
                },
                event = next_stream_event(&mut self.stream) => self.handle_stream_event(event, view),
                () = sleep_until(self.debounce.deadline()) => self.handle_debounce(view),
                Some(result) = self.results_rx.recv() => {
                    self.in_flight -= 1;
                    self.handle_result(result, view);
                }
                () = tokio::time::sleep(CLIP_POLL), if self.playback.is_playing() => {
                    if self.playback.poll_finished() {
                        view.status_changed(&self.status());
                    }
                }
            }
        }
        debug!("controller: stopped");
    }

    fn handle_command<V: ChatView>(&mut self, command: Command, view: &mut V) {
        match command {
            Command::Submit(text) => self.submit(&text, view),
            Command::Ask(text) => self.ask(&text, view),
            Command::ToggleMic => self.toggle_mic(view),
            Command::Speak(index) => self.speak(index, view),
            Command::Close => self.shutdown(),
        }
    }

    fn set_phase<V: ChatView>(&mut self, phase: Phase, view: &mut V) {
        self.phase = phase;
        view.status_changed(&self.status());
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = TaskResult> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.results_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    // -------------------------------------------------------------------------
    // Streaming exchange
    // -------------------------------------------------------------------------

    fn submit<V: ChatView>(&mut self, text: &str, view: &mut V) {
        let Some((question, index)) = self.conversation.begin(text) else {
            debug!(pending = self.conversation.pending(), "controller: submit ignored");
            return;
        };
        if let Some(turn) = self.conversation.turn(index) {
            view.turn_appended(index, turn);
        }
        self.set_phase(Phase::Sending, view);

        let backend = Arc::clone(&self.backend);
        let session_id = self.conversation.session_id().map(str::to_owned);
        self.spawn(async move {
            TaskResult::StreamOpened(backend.stream_chat(&question, session_id.as_deref()).await)
        });
    }

    fn stream_opened<V: ChatView>(&mut self, result: Result<ChatStream, ApiError>, view: &mut V) {
        match result {
            Ok(stream) => {
                let index = self.conversation.push_ai("");
                if let Some(turn) = self.conversation.turn(index) {
                    view.turn_appended(index, turn);
                }
                self.stream = Some(ActiveStream { stream, index });
                self.set_phase(Phase::Streaming, view);
            }
            Err(e) => {
                warn!(error = %e, "controller: stream open failed");
                self.conversation.finish();
                self.set_phase(Phase::Idle, view);
            }
        }
    }

    fn handle_stream_event<V: ChatView>(&mut self, event: Option<Result<ChatStreamEvent, ApiError>>, view: &mut V) {
        let Some(index) = self.stream.as_ref().map(|active| active.index) else {
            return;
        };
        match event {
            Some(Ok(ChatStreamEvent::Chunk(text))) => {
                self.conversation.append(index, &text);
                view.chunk_appended(index, &text);
                self.debounce.schedule(Instant::now());
            }
            Some(Ok(ChatStreamEvent::Done(session_id))) => {
                if self.conversation.adopt_session(&session_id) {
                    info!(%session_id, "controller: session assigned");
                }
                self.finish_stream(index, true, view);
            }
            Some(Ok(ChatStreamEvent::ServerError(message))) => {
                warn!(%message, "controller: server reported stream error");
                self.finish_stream(index, false, view);
            }
            Some(Err(e)) => {
                warn!(error = %e, "controller: stream failed");
                self.finish_stream(index, false, view);
            }
            None => {
                warn!("controller: stream ended without done");
                self.finish_stream(index, false, view);
            }
        }
    }

    fn finish_stream<V: ChatView>(&mut self, index: usize, completed: bool, view: &mut V) {
        self.debounce.cancel();
        if let Some(active) = self.stream.take() {
            active.stream.close();
        }
        self.set_phase(Phase::Rendering, view);
        if let Some(turn) = self.conversation.render(index) {
            view.turn_rendered(index, turn);
        }
        self.conversation.finish();
        self.set_phase(Phase::Idle, view);
        if completed {
            view.answer_completed(index);
        }
    }

    fn handle_debounce<V: ChatView>(&mut self, view: &mut V) {
        self.debounce.fire();
        let Some(index) = self.stream.as_ref().map(|active| active.index) else {
            return;
        };
        if let Some(turn) = self.conversation.render(index) {
            view.turn_rendered(index, turn);
        }
    }

    // -------------------------------------------------------------------------
    // One-shot exchange
    // -------------------------------------------------------------------------

    fn ask<V: ChatView>(&mut self, text: &str, view: &mut V) {
        let Some((question, index)) = self.conversation.begin(text) else {
            debug!(pending = self.conversation.pending(), "controller: ask ignored");
            return;
        };
        if let Some(turn) = self.conversation.turn(index) {
            view.turn_appended(index, turn);
        }
        self.set_phase(Phase::Sending, view);

        let backend = Arc::clone(&self.backend);
        let session_id = self.conversation.session_id().map(str::to_owned);
        self.spawn(async move { TaskResult::Answered(backend.chat(&question, session_id.as_deref()).await) });
    }

    fn answered<V: ChatView>(&mut self, result: Result<ChatReply, ApiError>, view: &mut V) {
        match result {
            Ok(reply) => {
                if let Some(session_id) = reply.session_id.as_deref() {
                    if self.conversation.adopt_session(session_id) {
                        info!(%session_id, "controller: session assigned");
                    }
                }
                let index = self.conversation.push_ai(reply.answer_or_placeholder());
                self.conversation.render(index);
                if let Some(turn) = self.conversation.turn(index) {
                    view.turn_appended(index, turn);
                }
                self.conversation.finish();
                self.set_phase(Phase::Idle, view);
                view.answer_completed(index);
            }
            Err(e) => {
                warn!(error = %e, "controller: chat failed");
                self.conversation.finish();
                self.set_phase(Phase::Idle, view);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Voice
    // -------------------------------------------------------------------------

    fn toggle_mic<V: ChatView>(&mut self, view: &mut V) {
        match self.recorder.toggle() {
            MicToggle::Started => info!("controller: recording"),
            MicToggle::Denied | MicToggle::Failed => {}
            MicToggle::Finished(clip) => {
                debug!(bytes = clip.bytes.len(), "controller: transcribing");
                let backend = Arc::clone(&self.backend);
                self.spawn(async move { TaskResult::Transcribed(backend.transcribe(clip).await) });
            }
        }
        view.status_changed(&self.status());
    }

    fn transcribed<V: ChatView>(&mut self, result: Result<Option<String>, ApiError>, view: &mut V) {
        match result {
            Ok(Some(text)) => self.submit(&text, view),
            Ok(None) => debug!("controller: empty transcription"),
            Err(e) => warn!(error = %e, "controller: transcription failed"),
        }
    }

    fn speak<V: ChatView>(&mut self, index: usize, view: &mut V) {
        let Some(text) = self.conversation.turn(index).map(|turn| turn.content.clone()) else {
            debug!(index, "controller: speak ignored, no such turn");
            return;
        };
        if let PlaybackRequest::Fetch(ticket) = self.playback.request(index) {
            let backend = Arc::clone(&self.backend);
            self.spawn(async move {
                let result = backend.synthesize(&text).await;
                TaskResult::Synthesized { ticket, result }
            });
        }
        view.status_changed(&self.status());
    }

    fn synthesized<V: ChatView>(&mut self, ticket: Ticket, result: Result<Vec<u8>, ApiError>, view: &mut V) {
        if !self.playback.is_current(ticket) {
            debug!(?ticket, "controller: stale speech discarded");
            return;
        }
        let played = result
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.output.play(bytes).map_err(|e| e.to_string()));
        match played {
            Ok(clip) => {
                self.playback.started(ticket, clip);
            }
            Err(error) => {
                warn!(%error, "controller: playback failed");
                self.playback.failed(ticket);
            }
        }
        view.status_changed(&self.status());
    }

    fn handle_result<V: ChatView>(&mut self, result: TaskResult, view: &mut V) {
        match result {
            TaskResult::StreamOpened(result) => self.stream_opened(result, view),
            TaskResult::Answered(result) => self.answered(result, view),
            TaskResult::Transcribed(result) => self.transcribed(result, view),
            TaskResult::Synthesized { ticket, result } => self.synthesized(ticket, result, view),
        }
    }

    fn shutdown(&mut self) {
        if let Some(active) = self.stream.take() {
            active.stream.close();
        }
        self.debounce.cancel();
        self.playback.stop();
        self.recorder.discard();
        info!(turns = self.conversation.len(), "controller: closed");
    }
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("status", &self.status())
            .field("turns", &self.conversation.len())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

async fn next_stream_event(stream: &mut Option<ActiveStream>) -> Option<Result<ChatStreamEvent, ApiError>> {
    match stream {
        Some(active) => active.stream.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
