//! Recording controller: microphone capture with an explicit state machine.
//!
//! At most one recording is active at a time. The transitional states
//! (`WillStart`, `WillStop`) guard against overlapping start/stop requests
//! while device acquisition or the final drain is in flight; redundant
//! requests are rejected as no-ops. Any device failure releases whatever
//! was partially acquired and lands back in `Idle`.
//!
//! The device itself sits behind [`CaptureBackend`] so the state machine
//! is testable without audio hardware.

use tracing::{info, warn};

use crate::audio::{self, wav, AudioConsumer, CAPTURE_SAMPLE_RATE};

/// Recording session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// Start requested; waiting on device acquisition.
    WillStart,
    Recording,
    /// Stop requested; waiting on the final drain and encode.
    WillStop,
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::WillStart => write!(f, "willStart"),
            Self::Recording => write!(f, "recording"),
            Self::WillStop => write!(f, "willStop"),
        }
    }
}

/// Seam between the recording state machine and the audio device.
pub trait CaptureBackend {
    /// Acquire the device and start capturing.
    fn begin(&mut self) -> anyhow::Result<()>;

    /// Stop capturing, release the device, and return everything captured
    /// (16 kHz mono f32).
    fn finish(&mut self) -> anyhow::Result<Vec<f32>>;

    /// Release the device and discard any captured audio.
    fn abort(&mut self);
}

/// Wrapper to make `cpal::Stream` Send.
///
/// `cpal::Stream` is `!Send` on some platforms due to internal raw
/// pointers, but we only hold it alive — the audio callback runs on a
/// thread cpal manages, and we never touch the stream except to drop it.
struct SendStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendStream {}

/// Real microphone backend: cpal capture into an SPSC ring buffer.
#[derive(Default)]
pub struct CpalCapture {
    stream: Option<SendStream>,
    consumer: Option<AudioConsumer>,
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            stream: None,
            consumer: None,
            device_name,
        }
    }
}

impl CaptureBackend for CpalCapture {
    fn begin(&mut self) -> anyhow::Result<()> {
        let (producer, consumer) = audio::audio_ring_buffer(None);
        let stream = audio::start_capture(producer, self.device_name.as_deref())?;
        self.stream = Some(SendStream(stream));
        self.consumer = Some(consumer);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<Vec<f32>> {
        // Dropping the stream releases the device before we drain.
        self.stream = None;
        let mut consumer = self
            .consumer
            .take()
            .ok_or_else(|| anyhow::anyhow!("No active capture to finish"))?;
        Ok(consumer.drain_all())
    }

    fn abort(&mut self) {
        self.stream = None;
        self.consumer = None;
    }
}

/// Drives a [`CaptureBackend`] through the recording state machine and
/// encodes the result for upload.
pub struct RecordingController<B: CaptureBackend> {
    state: RecordingState,
    backend: B,
}

impl<B: CaptureBackend> RecordingController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            state: RecordingState::Idle,
            backend,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Start capturing. Returns `Ok(false)` when the request is rejected
    /// because a recording is active or a transition is in flight.
    pub fn start(&mut self) -> anyhow::Result<bool> {
        if self.state != RecordingState::Idle {
            warn!(state = %self.state, "Ignoring start request");
            return Ok(false);
        }
        self.state = RecordingState::WillStart;
        match self.backend.begin() {
            Ok(()) => {
                self.state = RecordingState::Recording;
                info!("Recording started");
                Ok(true)
            }
            Err(e) => {
                // Release anything partially acquired before reporting.
                self.backend.abort();
                self.state = RecordingState::Idle;
                Err(e)
            }
        }
    }

    /// Stop capturing and return the recording as WAV bytes, ready for
    /// upload. Returns `Ok(None)` when there is nothing to stop. The
    /// device and capture buffer are released on every exit path.
    pub fn stop(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        if self.state != RecordingState::Recording {
            warn!(state = %self.state, "Ignoring stop request");
            return Ok(None);
        }
        self.state = RecordingState::WillStop;
        let result = self.backend.finish();
        // Whatever happened, the session is over.
        self.backend.abort();
        self.state = RecordingState::Idle;

        let samples = result?;
        if samples.is_empty() {
            warn!("Recording stopped with no captured audio");
            return Ok(None);
        }
        info!(
            samples = samples.len(),
            duration_secs = samples.len() as f64 / CAPTURE_SAMPLE_RATE as f64,
            "Recording stopped"
        );
        Ok(Some(wav::encode_wav(&samples, CAPTURE_SAMPLE_RATE)))
    }

    /// Teardown: release the device and return to `Idle` no matter what.
    pub fn abort(&mut self) {
        if self.state != RecordingState::Idle {
            info!(state = %self.state, "Aborting recording");
        }
        self.backend.abort();
        self.state = RecordingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted backend for exercising the state machine without a device.
    #[derive(Default)]
    struct MockBackend {
        fail_begin: bool,
        fail_finish: bool,
        captured: Vec<f32>,
        begin_calls: usize,
        abort_calls: usize,
    }

    impl CaptureBackend for MockBackend {
        fn begin(&mut self) -> anyhow::Result<()> {
            self.begin_calls += 1;
            if self.fail_begin {
                anyhow::bail!("microphone unavailable");
            }
            Ok(())
        }

        fn finish(&mut self) -> anyhow::Result<Vec<f32>> {
            if self.fail_finish {
                anyhow::bail!("drain failed");
            }
            Ok(std::mem::take(&mut self.captured))
        }

        fn abort(&mut self) {
            self.abort_calls += 1;
        }
    }

    #[test]
    fn test_start_stop_roundtrip() {
        let mut ctrl = RecordingController::new(MockBackend {
            captured: vec![0.5; 160],
            ..Default::default()
        });
        assert!(ctrl.start().unwrap());
        assert_eq!(ctrl.state(), RecordingState::Recording);

        let wav = ctrl.stop().unwrap().expect("wav bytes");
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }

    #[test]
    fn test_start_rejected_while_recording() {
        let mut ctrl = RecordingController::new(MockBackend {
            captured: vec![0.0; 16],
            ..Default::default()
        });
        assert!(ctrl.start().unwrap());
        // Second start is a no-op, not an error, and does not touch the device.
        assert!(!ctrl.start().unwrap());
        assert_eq!(ctrl.backend.begin_calls, 1);
        assert_eq!(ctrl.state(), RecordingState::Recording);
    }

    #[test]
    fn test_stop_rejected_while_idle() {
        let mut ctrl = RecordingController::new(MockBackend::default());
        assert!(ctrl.stop().unwrap().is_none());
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }

    #[test]
    fn test_device_failure_returns_to_idle() {
        let mut ctrl = RecordingController::new(MockBackend {
            fail_begin: true,
            ..Default::default()
        });
        assert!(ctrl.start().is_err());
        assert_eq!(ctrl.state(), RecordingState::Idle);
        // Partial acquisition was released.
        assert_eq!(ctrl.backend.abort_calls, 1);

        // The controller is usable again afterwards.
        ctrl.backend.fail_begin = false;
        assert!(ctrl.start().unwrap());
    }

    #[test]
    fn test_failed_drain_still_releases() {
        let mut ctrl = RecordingController::new(MockBackend {
            fail_finish: true,
            ..Default::default()
        });
        ctrl.start().unwrap();
        assert!(ctrl.stop().is_err());
        assert_eq!(ctrl.state(), RecordingState::Idle);
        assert!(ctrl.backend.abort_calls >= 1);
    }

    #[test]
    fn test_empty_capture_yields_nothing() {
        let mut ctrl = RecordingController::new(MockBackend::default());
        ctrl.start().unwrap();
        assert!(ctrl.stop().unwrap().is_none());
    }

    #[test]
    fn test_abort_from_recording() {
        let mut ctrl = RecordingController::new(MockBackend {
            captured: vec![0.1; 16],
            ..Default::default()
        });
        ctrl.start().unwrap();
        ctrl.abort();
        assert_eq!(ctrl.state(), RecordingState::Idle);
    }
}
