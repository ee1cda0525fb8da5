//! Host-side widget state: launcher button, widget frame, notification dot.
//!
//! DESIGN
//! ======
//! `HostWidget` is a pure state machine. Every input (button click, outside
//! click, Escape, a message from the widget, a timer firing, a command from a
//! [`WidgetHandle`]) returns the list of [`HostEffect`]s the embedder must
//! apply. Timers are requested as effects and fed back through
//! [`HostWidget::button_reveal_due`], so the state machine never sleeps.
//!
//! The toggle API is an explicit [`WidgetHandle`] returned by [`mount`]
//! instead of ambient global state; callers hold a clone and the embedder
//! drains the paired command receiver.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::embed::EmbedConfig;
use crate::message::FrameMessage;

#[cfg(test)]
#[path = "host_test.rs"]
mod host_test;

/// Delay before the launcher button first appears.
pub const INITIAL_REVEAL_DELAY: Duration = Duration::from_millis(1000);

/// Delay before the launcher button re-appears after the frame closes.
pub const CLOSE_REVEAL_DELAY: Duration = Duration::from_millis(300);

/// Something the embedder must do to its surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEffect {
    ShowFrame,
    HideFrame,
    ShowButton,
    HideButton,
    /// Call [`HostWidget::button_reveal_due`] after the delay.
    ScheduleButtonReveal(Duration),
    ShowNotification,
    HideNotification,
    /// Deliver a control message to the widget frame.
    PostToWidget(FrameMessage),
}

/// Command sent through a [`WidgetHandle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCommand {
    Open,
    Close,
    Toggle,
}

/// Receiving side of a [`WidgetHandle`], drained by the embedder.
pub type HostCommands = mpsc::UnboundedReceiver<HostCommand>;

/// Cloneable control handle for one mounted widget.
#[derive(Clone, Debug)]
pub struct WidgetHandle {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl WidgetHandle {
    /// Open the widget if it is closed. Returns `false` once the host is gone.
    pub fn open(&self) -> bool {
        self.tx.send(HostCommand::Open).is_ok()
    }

    /// Ask the widget to close itself. Returns `false` once the host is gone.
    pub fn close(&self) -> bool {
        self.tx.send(HostCommand::Close).is_ok()
    }

    /// Flip the widget between open and closed. Returns `false` once the host is gone.
    pub fn toggle(&self) -> bool {
        self.tx.send(HostCommand::Toggle).is_ok()
    }
}

/// Mount a widget: returns its host state, a handle for callers, and the
/// command receiver the embedder feeds into [`HostWidget::apply`].
#[must_use]
pub fn mount(config: EmbedConfig) -> (HostWidget, WidgetHandle, HostCommands) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostWidget::new(config), WidgetHandle { tx }, rx)
}

/// Open/closed state of one embedded widget as seen by the host page.
#[derive(Debug)]
pub struct HostWidget {
    config: EmbedConfig,
    origin: String,
    open: bool,
    button_visible: bool,
    notification: bool,
}

impl HostWidget {
    #[must_use]
    pub fn new(config: EmbedConfig) -> Self {
        let origin = config.widget_origin();
        Self { config, origin, open: false, button_visible: false, notification: false }
    }

    #[must_use]
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn button_visible(&self) -> bool {
        self.button_visible
    }

    #[must_use]
    pub fn has_notification(&self) -> bool {
        self.notification
    }

    /// Effects to apply right after mounting: the button appears after a delay.
    #[must_use]
    pub fn start(&self) -> Vec<HostEffect> {
        vec![HostEffect::ScheduleButtonReveal(INITIAL_REVEAL_DELAY)]
    }

    /// A scheduled reveal fired; the button shows only if still closed.
    pub fn button_reveal_due(&mut self) -> Vec<HostEffect> {
        if self.open || self.button_visible {
            return Vec::new();
        }
        self.button_visible = true;
        vec![HostEffect::ShowButton]
    }

    /// Launcher button click.
    pub fn toggle(&mut self) -> Vec<HostEffect> {
        if self.open { self.hide() } else { self.show() }
    }

    /// Apply a command received from a [`WidgetHandle`].
    pub fn apply(&mut self, command: HostCommand) -> Vec<HostEffect> {
        match command {
            HostCommand::Open if !self.open => self.show(),
            HostCommand::Open => Vec::new(),
            HostCommand::Close if self.open => vec![HostEffect::PostToWidget(FrameMessage::Close)],
            HostCommand::Close => Vec::new(),
            HostCommand::Toggle => self.toggle(),
        }
    }

    /// Click anywhere outside the widget.
    pub fn outside_click(&mut self) -> Vec<HostEffect> {
        if self.open { self.hide() } else { Vec::new() }
    }

    /// Escape key on the host page.
    pub fn escape(&mut self) -> Vec<HostEffect> {
        self.outside_click()
    }

    /// Handle a control message posted by the widget frame. Messages from
    /// any origin other than the widget's are ignored.
    pub fn receive(&mut self, origin: &str, message: FrameMessage) -> Vec<HostEffect> {
        if origin != self.origin {
            return Vec::new();
        }
        match message {
            FrameMessage::CloseChat if self.open => self.hide(),
            FrameMessage::NewMessage if !self.open && !self.notification => {
                self.notification = true;
                vec![HostEffect::ShowNotification]
            }
            _ => Vec::new(),
        }
    }

    /// Like [`HostWidget::receive`] for a raw payload: a legacy string or a
    /// tagged JSON message. Unrecognized payloads are ignored.
    pub fn receive_raw(&mut self, origin: &str, raw: &str) -> Vec<HostEffect> {
        let message = FrameMessage::from_legacy(raw).or_else(|| serde_json::from_str(raw).ok());
        match message {
            Some(message) => self.receive(origin, message),
            None => Vec::new(),
        }
    }

    fn show(&mut self) -> Vec<HostEffect> {
        self.open = true;
        self.button_visible = false;
        let mut effects = vec![HostEffect::ShowFrame, HostEffect::HideButton];
        if self.notification {
            self.notification = false;
            effects.push(HostEffect::HideNotification);
        }
        effects
    }

    fn hide(&mut self) -> Vec<HostEffect> {
        self.open = false;
        vec![HostEffect::HideFrame, HostEffect::ScheduleButtonReveal(CLOSE_REVEAL_DELAY)]
    }
}
