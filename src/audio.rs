//! Audio — microphone capture and clip playback behind small traits.
//!
//! DESIGN
//! ======
//! The controller owns one `AudioCapture` and one `AudioOutput`. Without the
//! `audio` feature both are `Unavailable*` stand-ins that fail every request,
//! which the controller treats the same way a browser treats a denied
//! microphone: a silent revert to idle. With the feature, playback goes
//! through `rodio` and capture through the `cpal` it re-exports; captured
//! samples are encoded as 16-bit PCM WAV before upload.

use thiserror::Error;

#[cfg(test)]
#[path = "audio_test.rs"]
mod audio_test;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio {0} is not available in this build")]
    Unavailable(&'static str),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("not recording")]
    NotRecording,
}

// =============================================================================
// CLIP DATA
// =============================================================================

/// A finished recording ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
}

impl AudioClip {
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self { bytes, mime: mime.into(), file_name: file_name.into() }
    }

    /// A WAV recording named `audio.wav`.
    #[must_use]
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "audio/wav", "audio.wav")
    }
}

/// Encode interleaved 16-bit samples as a PCM WAV file.
#[must_use]
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS: u16 = 16;
    let block_align = channels * (BITS / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = u32::try_from(samples.len() * 2).unwrap_or(u32::MAX);

    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36u32.saturating_add(data_len)).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

// =============================================================================
// TRAITS
// =============================================================================

/// Microphone recorder.
pub trait AudioCapture {
    /// Acquire the microphone and start buffering.
    ///
    /// # Errors
    ///
    /// Returns an error if no device is available or access is denied.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop recording and return everything captured since `start`.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::NotRecording`] when `start` did not succeed.
    fn stop(&mut self) -> Result<AudioClip, AudioError>;

    /// Stop recording and drop the buffer.
    fn discard(&mut self);
}

/// Audio output device.
pub trait AudioOutput {
    /// Decode `bytes` and start playing them.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded or no device is open.
    fn play(&mut self, bytes: Vec<u8>) -> Result<Box<dyn Clip>, AudioError>;
}

/// A clip that is playing.
pub trait Clip {
    fn stop(&mut self);
    fn is_finished(&self) -> bool;
}

// =============================================================================
// UNAVAILABLE
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCapture;

impl AudioCapture for UnavailableCapture {
    fn start(&mut self) -> Result<(), AudioError> {
        Err(AudioError::Unavailable("capture"))
    }

    fn stop(&mut self) -> Result<AudioClip, AudioError> {
        Err(AudioError::NotRecording)
    }

    fn discard(&mut self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableOutput;

impl AudioOutput for UnavailableOutput {
    fn play(&mut self, _bytes: Vec<u8>) -> Result<Box<dyn Clip>, AudioError> {
        Err(AudioError::Unavailable("output"))
    }
}

/// Best capture available in this build.
#[must_use]
pub fn default_capture() -> Box<dyn AudioCapture> {
    #[cfg(feature = "audio")]
    {
        Box::new(device::DeviceCapture::default())
    }
    #[cfg(not(feature = "audio"))]
    {
        Box::new(UnavailableCapture)
    }
}

/// Best output available in this build. Falls back to [`UnavailableOutput`]
/// when the device cannot be opened.
#[must_use]
pub fn default_output() -> Box<dyn AudioOutput> {
    #[cfg(feature = "audio")]
    {
        match device::DeviceOutput::open() {
            Ok(output) => return Box::new(output),
            Err(e) => tracing::warn!(error = %e, "audio: output device unavailable"),
        }
    }
    Box::new(UnavailableOutput)
}

// =============================================================================
// DEVICES
// =============================================================================

#[cfg(feature = "audio")]
pub mod device {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use rodio::cpal::{self, SampleFormat};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    use super::{AudioCapture, AudioClip, AudioError, AudioOutput, Clip, encode_wav};

    /// Default output device through rodio.
    pub struct DeviceOutput {
        // Playback stops when the stream is dropped.
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl DeviceOutput {
        /// # Errors
        ///
        /// Returns an error if no output device can be opened.
        pub fn open() -> Result<Self, AudioError> {
            let (stream, handle) = OutputStream::try_default().map_err(|e| AudioError::Device(e.to_string()))?;
            Ok(Self { _stream: stream, handle })
        }
    }

    impl AudioOutput for DeviceOutput {
        fn play(&mut self, bytes: Vec<u8>) -> Result<Box<dyn Clip>, AudioError> {
            let source = Decoder::new(Cursor::new(bytes)).map_err(|e| AudioError::Decode(e.to_string()))?;
            let sink = Sink::try_new(&self.handle).map_err(|e| AudioError::Device(e.to_string()))?;
            sink.append(source);
            Ok(Box::new(SinkClip { sink }))
        }
    }

    struct SinkClip {
        sink: Sink,
    }

    impl Clip for SinkClip {
        fn stop(&mut self) {
            self.sink.stop();
        }

        fn is_finished(&self) -> bool {
            self.sink.empty()
        }
    }

    /// Default input device through cpal.
    #[derive(Default)]
    pub struct DeviceCapture {
        active: Option<ActiveCapture>,
    }

    struct ActiveCapture {
        stream: cpal::Stream,
        samples: Arc<Mutex<Vec<i16>>>,
        sample_rate: u32,
        channels: u16,
    }

    impl AudioCapture for DeviceCapture {
        fn start(&mut self) -> Result<(), AudioError> {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or(AudioError::Unavailable("input device"))?;
            let supported = device.default_input_config().map_err(device_err)?;
            let format = supported.sample_format();
            let config: cpal::StreamConfig = supported.into();

            let samples = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&samples);
            let on_error = |e: cpal::StreamError| tracing::warn!(error = %e, "audio: capture stream error");
            let stream = match format {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| push(&sink, data.iter().map(|s| f32_to_i16(*s))),
                    on_error,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| push(&sink, data.iter().copied()),
                    on_error,
                    None,
                ),
                SampleFormat::U16 => device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        push(&sink, data.iter().map(|s| u16_to_i16(*s)));
                    },
                    on_error,
                    None,
                ),
                other => return Err(AudioError::Device(format!("unsupported sample format {other:?}"))),
            }
            .map_err(device_err)?;
            stream.play().map_err(device_err)?;

            self.active = Some(ActiveCapture {
                stream,
                samples,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            });
            Ok(())
        }

        fn stop(&mut self) -> Result<AudioClip, AudioError> {
            let active = self.active.take().ok_or(AudioError::NotRecording)?;
            drop(active.stream);
            let samples = active
                .samples
                .lock()
                .map(|mut s| std::mem::take(&mut *s))
                .unwrap_or_default();
            Ok(AudioClip::wav(encode_wav(&samples, active.sample_rate, active.channels)))
        }

        fn discard(&mut self) {
            self.active = None;
        }
    }

    fn push(sink: &Mutex<Vec<i16>>, samples: impl Iterator<Item = i16>) {
        if let Ok(mut buf) = sink.lock() {
            buf.extend(samples);
        }
    }

    fn device_err(e: impl std::fmt::Display) -> AudioError {
        AudioError::Device(e.to_string())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn u16_to_i16(sample: u16) -> i16 {
        (i32::from(sample) - 32_768) as i16
    }

    #[allow(clippy::cast_possible_truncation)]
    fn f32_to_i16(sample: f32) -> i16 {
        (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
    }
}
