//! Streamed assistant replies.
//!
//! A reply "turn" arrives as indexed segments that may be delivered out of
//! order. The [`buffer::SegmentBuffer`] holds them sparsely by index and the
//! [`sequencer::PlaybackSequencer`] drains them in strict index order,
//! pairing audio playback with viseme frame stepping.

pub mod buffer;
pub mod sequencer;

use std::sync::Arc;

use crate::avatar::shapes::VisemeFrame;

/// One inbound unit of a streamed assistant reply.
#[derive(Debug, Clone)]
pub struct ReplySegment {
    /// Zero-based position within the turn; establishes playback order.
    pub index: usize,
    /// Turn-boundary marker: `1` on the first batch of a new turn.
    pub send_count: u32,
    /// Encoded audio payload (mp3). Absent for completion markers.
    pub audio: Option<Arc<[u8]>>,
    /// Viseme frames at 60 Hz, one per render frame of the audio.
    pub shapes: Arc<[VisemeFrame]>,
    /// Partial transcript fragment to append to the running response text.
    pub text: String,
    /// Seconds the audio lasts; `0` marks a terminal/empty segment.
    pub audio_duration: f64,
}

/// The currently playing segment's render inputs.
///
/// Published by the sequencer and read by the viseme renderer. Replaced
/// wholesale (an `Arc` swap) on every dequeue so the render tick never
/// observes a half-updated value.
#[derive(Debug, Clone)]
pub struct RenderSnapshot {
    pub audio: Option<Arc<[u8]>>,
    pub shapes: Arc<[VisemeFrame]>,
    pub audio_duration: f64,
}

impl RenderSnapshot {
    pub fn empty() -> Self {
        Self {
            audio: None,
            shapes: Arc::from(Vec::new()),
            audio_duration: 0.0,
        }
    }
}
