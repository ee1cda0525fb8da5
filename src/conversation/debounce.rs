//! Render debounce for streaming answers.
//!
//! At most one render is pending at a time: the first chunk after a render
//! arms the deadline, later chunks inside the window leave it alone.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RenderDebounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl RenderDebounce {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    /// Arm the deadline unless one is already pending. Returns whether a new
    /// render was scheduled.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.window);
        true
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm after the deadline fired.
    pub fn fire(&mut self) {
        self.deadline = None;
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
