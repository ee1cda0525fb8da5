//! Voice playback selection.
//!
//! DESIGN
//! ======
//! At most one turn is selected for playback. Every new selection draws a
//! fresh ticket; the text-to-speech call carries it and its response is only
//! honored while the ticket is still current. A superseded response is
//! dropped without touching the current selection, so late audio for an
//! abandoned turn can never start playing or clear a newer selection.

use crate::audio::Clip;

/// Identifies one playback selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// What the caller must do after [`Playback::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRequest {
    /// The turn was already selected; playback is now stopped.
    Stop,
    /// Fetch speech for the turn and hand it back with this ticket.
    Fetch(Ticket),
}

struct Selection {
    index: usize,
    ticket: Ticket,
    clip: Option<Box<dyn Clip>>,
}

#[derive(Default)]
pub struct Playback {
    last_ticket: u64,
    current: Option<Selection>,
}

impl Playback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle playback for `index`. Selecting the same turn again stops it;
    /// selecting another turn stops the current clip first.
    pub fn request(&mut self, index: usize) -> PlaybackRequest {
        let previous = self.current.take();
        let same = previous.as_ref().is_some_and(|s| s.index == index);
        if let Some(mut selection) = previous {
            if let Some(clip) = selection.clip.as_mut() {
                clip.stop();
            }
        }
        if same {
            return PlaybackRequest::Stop;
        }

        self.last_ticket += 1;
        let ticket = Ticket(self.last_ticket);
        self.current = Some(Selection { index, ticket, clip: None });
        PlaybackRequest::Fetch(ticket)
    }

    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current.as_ref().is_some_and(|s| s.ticket == ticket && s.clip.is_none())
    }

    /// Attach a started clip. A clip for a stale ticket is stopped and
    /// dropped; returns whether it was kept.
    pub fn started(&mut self, ticket: Ticket, mut clip: Box<dyn Clip>) -> bool {
        match self.current.as_mut() {
            Some(selection) if selection.ticket == ticket && selection.clip.is_none() => {
                selection.clip = Some(clip);
                true
            }
            _ => {
                clip.stop();
                false
            }
        }
    }

    /// Fetch or decode failed. Clears the selection only if still current.
    pub fn failed(&mut self, ticket: Ticket) {
        if self.current.as_ref().is_some_and(|s| s.ticket == ticket) {
            self.current = None;
        }
    }

    /// Clear the selection once its clip has played out. Returns whether it did.
    pub fn poll_finished(&mut self) -> bool {
        let finished = self
            .current
            .as_ref()
            .and_then(|s| s.clip.as_ref())
            .is_some_and(|clip| clip.is_finished());
        if finished {
            self.current = None;
        }
        finished
    }

    pub fn stop(&mut self) {
        if let Some(mut selection) = self.current.take() {
            if let Some(clip) = selection.clip.as_mut() {
                clip.stop();
            }
        }
    }

    /// Selected turn, whether still fetching or playing.
    #[must_use]
    pub fn speaking(&self) -> Option<usize> {
        self.current.as_ref().map(|s| s.index)
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(|s| s.clip.is_some())
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("speaking", &self.speaking())
            .field("playing", &self.is_playing())
            .finish()
    }
}

#[cfg(test)]
#[path = "playback_test.rs"]
mod playback_test;
