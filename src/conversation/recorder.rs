//! Microphone toggle.

use crate::audio::{AudioCapture, AudioClip};

/// Outcome of [`Recorder::toggle`].
#[derive(Debug, PartialEq, Eq)]
pub enum MicToggle {
    Started,
    /// The microphone could not be acquired; still idle.
    Denied,
    /// Recording stopped with a clip to transcribe.
    Finished(AudioClip),
    /// Recording stopped without a usable clip.
    Failed,
}

pub struct Recorder {
    capture: Box<dyn AudioCapture>,
    recording: bool,
}

impl Recorder {
    #[must_use]
    pub fn new(capture: Box<dyn AudioCapture>) -> Self {
        Self { capture, recording: false }
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn toggle(&mut self) -> MicToggle {
        if !self.recording {
            return match self.capture.start() {
                Ok(()) => {
                    self.recording = true;
                    MicToggle::Started
                }
                Err(e) => {
                    tracing::debug!(error = %e, "mic: start refused");
                    MicToggle::Denied
                }
            };
        }

        self.recording = false;
        match self.capture.stop() {
            Ok(clip) if !clip.bytes.is_empty() => MicToggle::Finished(clip),
            Ok(_) => MicToggle::Failed,
            Err(e) => {
                tracing::debug!(error = %e, "mic: stop failed");
                MicToggle::Failed
            }
        }
    }

    /// Stop without producing a clip.
    pub fn discard(&mut self) {
        if self.recording {
            self.capture.discard();
            self.recording = false;
        }
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder").field("recording", &self.recording).finish_non_exhaustive()
    }
}
