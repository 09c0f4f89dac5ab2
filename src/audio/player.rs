//! Segment audio playback via rodio.
//!
//! Plays f32 PCM through the default output device. Playback is
//! fire-and-forget: the viseme renderer tracks elapsed time against the
//! segment's declared duration and decides when the segment is over, so
//! the sink is never slept on.

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use super::mp3;

/// Audio player for streamed reply segments.
pub struct AudioPlayer {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
}

impl AudioPlayer {
    /// Open the default audio output device.
    pub fn new() -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| anyhow::anyhow!("Failed to open audio output: {}", e))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| anyhow::anyhow!("Failed to create audio sink: {}", e))?;

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
        })
    }

    /// Decode an mp3 segment and start playing it, replacing whatever was
    /// playing before. Returns immediately.
    pub fn play_mp3(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let decoded = mp3::decode_mp3(bytes)?;
        if decoded.samples.is_empty() {
            anyhow::bail!("Decoded segment contains no samples");
        }
        self.sink.stop();
        // Every segment starts at full volume, whatever the last one left.
        self.set_volume(1.0);
        let source = SamplesBuffer::new(1, decoded.sample_rate, decoded.samples);
        self.sink.append(source);
        self.sink.play();
        Ok(())
    }

    /// Set playback volume (0.0 = silent, 1.0 = full volume).
    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    /// Stop current playback immediately and drop any queued audio.
    pub fn stop(&self) {
        self.sink.stop();
    }
}
