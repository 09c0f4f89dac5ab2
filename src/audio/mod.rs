//! Audio I/O: microphone capture, ring buffer, playback, and codecs.

pub mod capture;
pub mod mp3;
pub mod player;
pub mod ring_buffer;
pub mod wav;

pub use capture::start_capture;
pub use player::AudioPlayer;
pub use ring_buffer::{audio_ring_buffer, AudioConsumer, AudioProducer};

/// Sample rate every captured recording is delivered at.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
