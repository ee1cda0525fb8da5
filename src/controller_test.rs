use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Mutex;

use futures_util::stream;

use super::*;
use crate::audio::{AudioClip, AudioError, Clip, UnavailableCapture, UnavailableOutput};
use crate::conversation::Role;
use crate::markdown;

// =============================================================================
// FAKES
// =============================================================================

type EventTx = mpsc::UnboundedSender<Result<ChatStreamEvent, ApiError>>;

fn scripted_stream() -> (EventTx, ChatStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let events = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
    (tx, ChatStream::new(events))
}

fn chunk(text: &str) -> Result<ChatStreamEvent, ApiError> {
    Ok(ChatStreamEvent::Chunk(text.to_owned()))
}

fn done(session_id: &str) -> Result<ChatStreamEvent, ApiError> {
    Ok(ChatStreamEvent::Done(session_id.to_owned()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Stream { question: String, session_id: Option<String> },
    Chat { question: String, session_id: Option<String> },
    Transcribe(usize),
    Synthesize(String),
}

#[derive(Default)]
struct FakeBackend {
    streams: Mutex<VecDeque<ChatStream>>,
    replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
    transcripts: Mutex<VecDeque<Option<String>>>,
    speech: Mutex<VecDeque<(Duration, Vec<u8>)>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    fn with_stream(self, stream: ChatStream) -> Self {
        self.streams.lock().unwrap().push_back(stream);
        self
    }

    fn with_reply(self, reply: Result<ChatReply, ApiError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    fn with_transcript(self, text: Option<&str>) -> Self {
        self.transcripts.lock().unwrap().push_back(text.map(str::to_owned));
        self
    }

    fn with_speech(self, delay_ms: u64, bytes: &[u8]) -> Self {
        self.speech.lock().unwrap().push_back((Duration::from_millis(delay_ms), bytes.to_vec()));
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatBackend for FakeBackend {
    async fn chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatReply, ApiError> {
        self.calls.lock().unwrap().push(Call::Chat {
            question: question.to_owned(),
            session_id: session_id.map(str::to_owned),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Stream("no scripted reply".into())))
    }

    async fn stream_chat(&self, question: &str, session_id: Option<&str>) -> Result<ChatStream, ApiError> {
        self.calls.lock().unwrap().push(Call::Stream {
            question: question.to_owned(),
            session_id: session_id.map(str::to_owned),
        });
        self.streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Status { endpoint: "/chat/stream", status: 503, body: String::new() })
    }

    async fn transcribe(&self, clip: AudioClip) -> Result<Option<String>, ApiError> {
        self.calls.lock().unwrap().push(Call::Transcribe(clip.bytes.len()));
        Ok(self.transcripts.lock().unwrap().pop_front().flatten())
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        self.calls.lock().unwrap().push(Call::Synthesize(text.to_owned()));
        let next = self.speech.lock().unwrap().pop_front();
        match next {
            Some((delay, bytes)) => {
                tokio::time::sleep(delay).await;
                Ok(bytes)
            }
            None => Err(ApiError::Status { endpoint: "/tts", status: 500, body: String::new() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Turn(usize, Role, String),
    Chunk(usize, String),
    Rendered(usize, String),
    Status(Status),
    Completed(usize),
}

#[derive(Default)]
struct RecordingView {
    seen: Vec<Seen>,
}

impl RecordingView {
    fn rendered(&self, index: usize) -> Vec<String> {
        self.seen
            .iter()
            .filter_map(|seen| match seen {
                Seen::Rendered(i, html) if *i == index => Some(html.clone()),
                _ => None,
            })
            .collect()
    }

    fn completed(&self) -> Vec<usize> {
        self.seen
            .iter()
            .filter_map(|seen| match seen {
                Seen::Completed(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    fn phases(&self) -> Vec<Phase> {
        let mut phases: Vec<Phase> = Vec::new();
        for seen in &self.seen {
            if let Seen::Status(status) = seen {
                if phases.last() != Some(&status.phase) {
                    phases.push(status.phase);
                }
            }
        }
        phases
    }

    fn last_status(&self) -> Status {
        self.seen
            .iter()
            .rev()
            .find_map(|seen| match seen {
                Seen::Status(status) => Some(*status),
                _ => None,
            })
            .unwrap()
    }
}

impl ChatView for RecordingView {
    fn turn_appended(&mut self, index: usize, turn: &Turn) {
        self.seen.push(Seen::Turn(index, turn.role, turn.content.clone()));
    }

    fn chunk_appended(&mut self, index: usize, chunk: &str) {
        self.seen.push(Seen::Chunk(index, chunk.to_owned()));
    }

    fn turn_rendered(&mut self, index: usize, turn: &Turn) {
        self.seen.push(Seen::Rendered(index, turn.html.clone().unwrap_or_default()));
    }

    fn status_changed(&mut self, status: &Status) {
        self.seen.push(Seen::Status(*status));
    }

    fn answer_completed(&mut self, index: usize) {
        self.seen.push(Seen::Completed(index));
    }
}

struct FakeCapture;

impl AudioCapture for FakeCapture {
    fn start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioClip, AudioError> {
        Ok(AudioClip::wav(vec![1, 2, 3, 4]))
    }

    fn discard(&mut self) {}
}

#[derive(Default, Clone)]
struct OutputProbe {
    played: Rc<RefCell<Vec<Vec<u8>>>>,
    stopped: Rc<Cell<usize>>,
    finished: Rc<Cell<bool>>,
}

struct FakeOutput(OutputProbe);

impl AudioOutput for FakeOutput {
    fn play(&mut self, bytes: Vec<u8>) -> Result<Box<dyn Clip>, AudioError> {
        self.0.played.borrow_mut().push(bytes);
        Ok(Box::new(FakeClip(self.0.clone())))
    }
}

struct FakeClip(OutputProbe);

impl Clip for FakeClip {
    fn stop(&mut self) {
        self.0.stopped.set(self.0.stopped.get() + 1);
    }

    fn is_finished(&self) -> bool {
        self.0.finished.get()
    }
}

// =============================================================================
// HARNESS
// =============================================================================

fn quiet_config() -> Config {
    Config { greeting: None, ..Config::default() }
}

fn controller(backend: &Arc<FakeBackend>, config: &Config) -> ChatController {
    let backend: Arc<dyn ChatBackend> = backend.clone();
    ChatController::with_audio(backend, config, Box::new(UnavailableCapture), Box::new(UnavailableOutput))
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Run `commands` to completion with no further input.
async fn run_commands(controller: &mut ChatController, commands: Vec<Command>) -> RecordingView {
    let (tx, rx) = mpsc::unbounded_channel();
    for command in commands {
        tx.send(command).unwrap();
    }
    drop(tx);
    let mut view = RecordingView::default();
    controller.run(rx, &mut view).await;
    view
}

// =============================================================================
// STREAMING
// =============================================================================

#[tokio::test(start_paused = true)]
async fn streaming_answer_renders_on_debounce_and_on_done() {
    let (events, stream) = scripted_stream();
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());
    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();

    let driver = async move {
        tx.send(Command::Submit("  plan my trip ".into())).unwrap();
        tokio::time::sleep(ms(1)).await;
        events.send(chunk("1. Tra")).unwrap();
        events.send(chunk("vel")).unwrap();
        tokio::time::sleep(ms(30)).await;
        events.send(chunk("2. Food")).unwrap();
        tokio::time::sleep(ms(100)).await;
        events.send(chunk(" and more")).unwrap();
        events.send(done("s-1")).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    let turns = controller.conversation().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], Turn::user("plan my trip"));
    assert_eq!(turns[1].content, "1. Travel2. Food and more");
    assert_eq!(
        view.rendered(1),
        vec![markdown::to_html("1. Travel2. Food"), markdown::to_html("1. Travel2. Food and more")]
    );
    assert_eq!(turns[1].html.as_deref(), Some(markdown::to_html("1. Travel2. Food and more").as_str()));
    assert_eq!(controller.conversation().session_id(), Some("s-1"));
    assert!(!controller.conversation().pending());
    assert_eq!(view.completed(), vec![1]);
    assert_eq!(view.phases(), vec![Phase::Idle, Phase::Sending, Phase::Streaming, Phase::Rendering, Phase::Idle]);
    assert_eq!(
        backend.calls(),
        vec![Call::Stream { question: "plan my trip".into(), session_id: None }]
    );
}

#[tokio::test(start_paused = true)]
async fn chunks_are_forwarded_verbatim_in_order() {
    let (events, stream) = scripted_stream();
    for event in [chunk("a "), chunk(""), chunk(" b"), done("s")] {
        events.send(event).unwrap();
    }
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::Submit("q".into())]).await;

    let chunks: Vec<&Seen> = view.seen.iter().filter(|seen| matches!(seen, Seen::Chunk(..))).collect();
    assert_eq!(
        chunks,
        vec![&Seen::Chunk(1, "a ".into()), &Seen::Chunk(1, String::new()), &Seen::Chunk(1, " b".into())]
    );
    assert_eq!(controller.conversation().turns()[1].content, "a  b");
}

#[tokio::test(start_paused = true)]
async fn done_inside_window_renders_exactly_once() {
    let (events, stream) = scripted_stream();
    events.send(chunk("Hello")).unwrap();
    events.send(done("s-1")).unwrap();
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Submit("hi".into())).unwrap();
        // Past the debounce window: a leftover timer would render again.
        tokio::time::sleep(ms(500)).await;
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(view.rendered(1), vec!["<p>Hello</p>\n".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn final_html_is_independent_of_chunk_boundaries() {
    let answer = "Here you go:1. Travel2. Food- snacks";
    let splits: [&[usize]; 3] = [&[], &[5, 13, 20], &[1, 2, 3, 4, 30]];

    for cuts in splits {
        let (events, stream) = scripted_stream();
        let mut start = 0;
        for &cut in cuts.iter().chain(std::iter::once(&answer.len())) {
            events.send(chunk(&answer[start..cut])).unwrap();
            start = cut;
        }
        events.send(done("s")).unwrap();

        let backend = Arc::new(FakeBackend::default().with_stream(stream));
        let mut controller = controller(&backend, &quiet_config());
        run_commands(&mut controller, vec![Command::Submit("q".into())]).await;

        assert_eq!(
            controller.conversation().turns()[1].html.as_deref(),
            Some(markdown::to_html(answer).as_str()),
            "cuts {cuts:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn session_is_never_overwritten() {
    let (first_events, first) = scripted_stream();
    let (second_events, second) = scripted_stream();
    first_events.send(chunk("one")).unwrap();
    first_events.send(done("s-1")).unwrap();
    second_events.send(chunk("two")).unwrap();
    second_events.send(done("s-2")).unwrap();
    let backend = Arc::new(FakeBackend::default().with_stream(first).with_stream(second));
    let mut controller = controller(&backend, &quiet_config());

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Submit("first".into())).unwrap();
        tokio::time::sleep(ms(10)).await;
        tx.send(Command::Submit("second".into())).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(controller.conversation().session_id(), Some("s-1"));
    assert_eq!(
        backend.calls(),
        vec![
            Call::Stream { question: "first".into(), session_id: None },
            Call::Stream { question: "second".into(), session_id: Some("s-1".into()) },
        ]
    );
    assert_eq!(view.completed(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn stream_error_keeps_partial_answer() {
    let (events, stream) = scripted_stream();
    events.send(chunk("1. Par")).unwrap();
    events.send(Err(ApiError::Stream("connection reset".into()))).unwrap();
    events.send(chunk("never seen")).unwrap();
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::Submit("q".into())]).await;

    let turn = &controller.conversation().turns()[1];
    assert_eq!(turn.content, "1. Par");
    assert_eq!(view.rendered(1), vec![markdown::to_html("1. Par")]);
    assert!(!controller.conversation().pending());
    assert_eq!(controller.conversation().session_id(), None);
    assert!(view.completed().is_empty());
    assert!(events.is_closed(), "connection closed on error");
}

#[tokio::test(start_paused = true)]
async fn named_error_event_and_eof_end_the_exchange() {
    let (events, stream) = scripted_stream();
    events.send(chunk("partial")).unwrap();
    events.send(Ok(ChatStreamEvent::ServerError("boom".into()))).unwrap();
    let (eof_events, eof_stream) = scripted_stream();
    eof_events.send(chunk("cut")).unwrap();
    drop(eof_events);
    let backend = Arc::new(FakeBackend::default().with_stream(stream).with_stream(eof_stream));
    let mut controller = controller(&backend, &quiet_config());

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Submit("a".into())).unwrap();
        tokio::time::sleep(ms(10)).await;
        tx.send(Command::Submit("b".into())).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    let turns = controller.conversation().turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[1].content, "partial");
    assert_eq!(turns[3].content, "cut");
    assert_eq!(view.rendered(3), vec![markdown::to_html("cut")]);
    assert!(view.completed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn open_failure_appends_no_ai_turn() {
    let backend = Arc::new(FakeBackend::default());
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::Submit("hello".into())]).await;

    assert_eq!(controller.conversation().turns(), &[Turn::user("hello")]);
    assert!(!controller.conversation().pending());
    assert_eq!(view.last_status().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn submit_while_pending_is_ignored() {
    let (events, stream) = scripted_stream();
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Submit("first".into())).unwrap();
        tx.send(Command::Submit("second".into())).unwrap();
        tokio::time::sleep(ms(10)).await;
        tx.send(Command::Submit("third".into())).unwrap();
        tokio::time::sleep(ms(10)).await;
        events.send(done("s")).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    let users: Vec<&str> = controller
        .conversation()
        .turns()
        .iter()
        .filter(|turn| turn.role == Role::User)
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(users, vec!["first"]);
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn blank_submit_is_a_no_op() {
    let backend = Arc::new(FakeBackend::default());
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::Submit(" \n\t ".into())]).await;

    assert!(controller.conversation().is_empty());
    assert!(backend.calls().is_empty());
    assert_eq!(view.phases(), vec![Phase::Idle]);
}

#[tokio::test(start_paused = true)]
async fn greeting_is_published_first() {
    let backend = Arc::new(FakeBackend::default());
    let mut controller = controller(&backend, &Config::default());

    let view = run_commands(&mut controller, Vec::new()).await;

    assert_eq!(view.seen[0], Seen::Turn(0, Role::Ai, crate::config::DEFAULT_GREETING.to_owned()));
    assert!(controller.conversation().turns()[0].html.is_some());
}

#[tokio::test(start_paused = true)]
async fn close_drops_the_open_stream() {
    let (events, stream) = scripted_stream();
    let backend = Arc::new(FakeBackend::default().with_stream(stream));
    let mut controller = controller(&backend, &quiet_config());

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async {
        tx.send(Command::Submit("q".into())).unwrap();
        tokio::time::sleep(ms(1)).await;
        events.send(chunk("part")).unwrap();
        tokio::time::sleep(ms(1)).await;
        tx.send(Command::Close).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert!(events.is_closed());
    assert_eq!(controller.conversation().turns()[1].content, "part");
}

// =============================================================================
// ONE-SHOT
// =============================================================================

#[tokio::test(start_paused = true)]
async fn ask_appends_rendered_answer_and_adopts_session() {
    let reply = ChatReply { answer: Some("**Paris**".into()), session_id: Some("s-9".into()) };
    let backend = Arc::new(FakeBackend::default().with_reply(Ok(reply)));
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::Ask("capital of France?".into())]).await;

    let turns = controller.conversation().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].role, Role::Ai);
    assert_eq!(turns[1].html.as_deref(), Some("<p><strong>Paris</strong></p>\n"));
    assert_eq!(controller.conversation().session_id(), Some("s-9"));
    assert_eq!(view.completed(), vec![1]);
    assert!(!controller.conversation().pending());
}

#[tokio::test(start_paused = true)]
async fn ask_without_answer_shows_placeholder() {
    let backend = Arc::new(FakeBackend::default().with_reply(Ok(ChatReply::default())));
    let mut controller = controller(&backend, &quiet_config());

    run_commands(&mut controller, vec![Command::Ask("?".into())]).await;

    assert_eq!(controller.conversation().turns()[1].content, crate::api::types::NO_ANSWER);
}

#[tokio::test(start_paused = true)]
async fn ask_failure_appends_nothing() {
    let backend = Arc::new(FakeBackend::default());
    let mut controller = controller(&backend, &quiet_config());

    run_commands(&mut controller, vec![Command::Ask("hello".into())]).await;

    assert_eq!(controller.conversation().turns(), &[Turn::user("hello")]);
    assert!(!controller.conversation().pending());
}

// =============================================================================
// VOICE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn transcribed_voice_enters_submit_path() {
    let (events, stream) = scripted_stream();
    events.send(chunk("Sure")).unwrap();
    events.send(done("s")).unwrap();
    let backend = Arc::new(FakeBackend::default().with_transcript(Some("book a table")).with_stream(stream));
    let dyn_backend: Arc<dyn ChatBackend> = backend.clone();
    let mut controller =
        ChatController::with_audio(dyn_backend, &quiet_config(), Box::new(FakeCapture), Box::new(UnavailableOutput));

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::ToggleMic).unwrap();
        tokio::time::sleep(ms(10)).await;
        tx.send(Command::ToggleMic).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(
        backend.calls(),
        vec![Call::Transcribe(4), Call::Stream { question: "book a table".into(), session_id: None }]
    );
    assert_eq!(controller.conversation().turns()[0], Turn::user("book a table"));
    assert!(view.seen.iter().any(|seen| matches!(seen, Seen::Status(Status { recording: true, .. }))));
    assert!(!view.last_status().recording);
}

#[tokio::test(start_paused = true)]
async fn empty_transcription_submits_nothing() {
    let backend = Arc::new(FakeBackend::default().with_transcript(None));
    let dyn_backend: Arc<dyn ChatBackend> = backend.clone();
    let mut controller =
        ChatController::with_audio(dyn_backend, &quiet_config(), Box::new(FakeCapture), Box::new(UnavailableOutput));

    run_commands(&mut controller, vec![Command::ToggleMic, Command::ToggleMic]).await;

    assert_eq!(backend.calls(), vec![Call::Transcribe(4)]);
    assert!(controller.conversation().is_empty());
}

#[tokio::test(start_paused = true)]
async fn denied_microphone_reverts_silently() {
    let backend = Arc::new(FakeBackend::default());
    let mut controller = controller(&backend, &quiet_config());

    let view = run_commands(&mut controller, vec![Command::ToggleMic]).await;

    assert!(!view.last_status().recording);
    assert!(backend.calls().is_empty());
}

fn speaking_controller(backend: &Arc<FakeBackend>, probe: &OutputProbe) -> ChatController {
    let dyn_backend: Arc<dyn ChatBackend> = backend.clone();
    let config = Config { greeting: Some("Hello there".into()), ..Config::default() };
    ChatController::with_audio(dyn_backend, &config, Box::new(UnavailableCapture), Box::new(FakeOutput(probe.clone())))
}

#[tokio::test(start_paused = true)]
async fn switching_turns_discards_late_speech() {
    let reply = ChatReply { answer: Some("Paris".into()), session_id: None };
    let backend = Arc::new(
        FakeBackend::default()
            .with_reply(Ok(reply))
            .with_speech(50, b"A")
            .with_speech(10, b"B"),
    );
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Ask("capital?".into())).unwrap();
        tokio::time::sleep(ms(1)).await;
        tx.send(Command::Speak(0)).unwrap();
        tokio::time::sleep(ms(10)).await;
        tx.send(Command::Speak(2)).unwrap();
        tokio::time::sleep(ms(100)).await;
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(*probe.played.borrow(), vec![b"B".to_vec()]);
    assert_eq!(controller.status().speaking, Some(2));
    assert_eq!(
        backend.calls()[1..],
        [Call::Synthesize("Hello there".into()), Call::Synthesize("Paris".into())]
    );
}

#[tokio::test(start_paused = true)]
async fn speaking_same_turn_twice_stops_playback() {
    let backend = Arc::new(FakeBackend::default().with_speech(5, b"A"));
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let driver = async move {
        tx.send(Command::Speak(0)).unwrap();
        tokio::time::sleep(ms(20)).await;
        tx.send(Command::Speak(0)).unwrap();
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(probe.played.borrow().len(), 1);
    assert_eq!(probe.stopped.get(), 1);
    assert_eq!(controller.status().speaking, None);
}

#[tokio::test(start_paused = true)]
async fn speaking_while_fetching_cancels() {
    let backend = Arc::new(FakeBackend::default().with_speech(50, b"A"));
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    let view = run_commands(&mut controller, vec![Command::Speak(0), Command::Speak(0)]).await;

    assert!(probe.played.borrow().is_empty());
    assert_eq!(view.last_status().speaking, None);
}

#[tokio::test(start_paused = true)]
async fn finished_clip_clears_selection() {
    let backend = Arc::new(FakeBackend::default().with_speech(5, b"A"));
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut view = RecordingView::default();
    let finished = Rc::clone(&probe.finished);
    let driver = async move {
        tx.send(Command::Speak(0)).unwrap();
        tokio::time::sleep(ms(20)).await;
        finished.set(true);
        tokio::time::sleep(ms(250)).await;
    };
    tokio::join!(controller.run(rx, &mut view), driver);

    assert_eq!(view.last_status().speaking, None);
    assert_eq!(probe.stopped.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_speech_clears_current_selection() {
    let backend = Arc::new(FakeBackend::default());
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    let view = run_commands(&mut controller, vec![Command::Speak(0)]).await;

    assert_eq!(view.last_status().speaking, None);
    assert!(probe.played.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn speaking_unknown_turn_is_ignored() {
    let backend = Arc::new(FakeBackend::default());
    let probe = OutputProbe::default();
    let mut controller = speaking_controller(&backend, &probe);

    run_commands(&mut controller, vec![Command::Speak(7)]).await;

    assert!(backend.calls().is_empty());
}
