//! Playback sequencer for streamed reply segments.
//!
//! Serializes presentation of [`ReplySegment`]s in strict index order no
//! matter what order the network delivers them, and coordinates audio
//! playback with viseme frame stepping. Every operation is a synchronous
//! step that returns the [`SequencerEvent`]s it produced; the chat session
//! routes those to the audio device, the renderer, and the UI shell. This
//! keeps the state machine free of I/O and independently testable.
//!
//! The cursor stalls ("waiting") when the next required index has not
//! arrived yet. A stalled turn resumes on the next arrival and has no
//! timeout: a permanently missing index parks the turn until the user
//! resets the context or a new turn preempts it.

use tracing::debug;

use super::buffer::SegmentBuffer;
use super::{RenderSnapshot, ReplySegment};

/// Playback cursor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    /// Nothing is being presented.
    #[default]
    Idle,
    /// A live turn is draining; transcript text accumulates.
    TurnPlaying,
    /// The user re-triggered playback of an already-received reply;
    /// audio and shapes replay but text is not re-appended.
    UserPlaying,
}

/// Typed effects produced by a sequencer step.
#[derive(Debug, Clone)]
pub enum SequencerEvent {
    /// A `send_count == 1` segment started a new turn; prior buffered
    /// segments, the cursor, and the accumulated text were discarded.
    TurnStarted,
    /// A transcript fragment was appended to the running response text.
    TextAppended(String),
    /// Start presenting this segment: play its audio and step its shapes.
    PlaySegment(RenderSnapshot),
    /// The buffer ran out at the cursor; the turn is complete.
    TurnExhausted,
    /// An explicit reset discarded all playback state; any in-flight
    /// audio and frame-stepping must stop.
    PlaybackAborted,
}

/// Drains the segment buffer strictly in index order.
#[derive(Debug, Default)]
pub struct PlaybackSequencer {
    buffer: SegmentBuffer,
    next_index: usize,
    /// Cursor stalled on a not-yet-arrived index.
    waiting: bool,
    /// A playable segment is currently with the audio device / renderer.
    /// While set, arrivals are only buffered; the next advance comes from
    /// the segment-finished event.
    presenting: bool,
    status: PlaybackStatus,
    response_text: String,
}

impl PlaybackSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }

    pub fn buffered_segments(&self) -> usize {
        self.buffer.len()
    }

    /// A segment arrived from the transport.
    ///
    /// `send_count == 1` marks a new turn: all buffered state is discarded
    /// before the segment is stored. The segment is stored at its index
    /// (last write wins) and consumption advances immediately when the
    /// cursor is not mid-segment and either points at this index or was
    /// stalled waiting for an arrival.
    pub fn on_segment_arrived(&mut self, segment: ReplySegment) -> Vec<SequencerEvent> {
        let mut out = Vec::new();

        if segment.send_count == 1 {
            debug!(index = segment.index, "New turn, resetting reply state");
            self.buffer.clear();
            self.next_index = 0;
            self.waiting = false;
            self.presenting = false;
            self.status = PlaybackStatus::TurnPlaying;
            self.response_text.clear();
            out.push(SequencerEvent::TurnStarted);
        }

        let index = segment.index;
        self.buffer.put(segment);

        if !self.presenting && (index == self.next_index || self.waiting) {
            self.waiting = false;
            self.advance(&mut out);
        }

        out
    }

    /// The active segment's audio ran its full duration (or its playback
    /// failed and was abandoned). Move on to the next index.
    pub fn on_segment_finished(&mut self) -> Vec<SequencerEvent> {
        let mut out = Vec::new();
        self.presenting = false;
        self.advance(&mut out);
        out
    }

    /// Replay the already-received reply from the beginning.
    ///
    /// Only honored while idle; replay reuses the live buffer, so a new
    /// turn arriving mid-replay preempts it. Text is not re-appended.
    pub fn replay_from_start(&mut self) -> Vec<SequencerEvent> {
        let mut out = Vec::new();
        if self.status == PlaybackStatus::Idle {
            self.status = PlaybackStatus::UserPlaying;
            self.next_index = 0;
            self.waiting = false;
            self.presenting = false;
            self.advance(&mut out);
        }
        out
    }

    /// Explicit session reset: drop the buffer, cursor, and text.
    ///
    /// Returns `PlaybackAborted` so the caller silences whatever is
    /// mid-flight with the audio device and renderer.
    pub fn reset(&mut self) -> Vec<SequencerEvent> {
        self.buffer.clear();
        self.next_index = 0;
        self.waiting = false;
        self.presenting = false;
        self.status = PlaybackStatus::Idle;
        self.response_text.clear();
        vec![SequencerEvent::PlaybackAborted]
    }

    /// Consume segments starting at the cursor.
    ///
    /// Zero-duration segments complete instantly without touching the audio
    /// device, so consumption loops until it either publishes a playable
    /// snapshot, stalls on a gap, or exhausts the buffer.
    fn advance(&mut self, out: &mut Vec<SequencerEvent>) {
        loop {
            let past_end = match self.buffer.max_index() {
                Some(max) => self.next_index > max,
                None => true,
            };
            if past_end {
                debug!(next_index = self.next_index, "Reply buffer exhausted");
                out.push(SequencerEvent::TurnExhausted);
                self.next_index = 0;
                self.waiting = false;
                self.presenting = false;
                self.status = PlaybackStatus::Idle;
                return;
            }

            let Some(segment) = self.buffer.get(self.next_index) else {
                // Gap below the highest stored index: the needed segment is
                // still in flight. Stall until it arrives.
                self.waiting = true;
                return;
            };
            let segment = segment.clone();
            self.next_index += 1;

            if self.status == PlaybackStatus::TurnPlaying && !segment.text.is_empty() {
                self.response_text.push_str(&segment.text);
                out.push(SequencerEvent::TextAppended(segment.text.clone()));
            }

            if segment.audio_duration > 0.0 {
                self.presenting = true;
                out.push(SequencerEvent::PlaySegment(RenderSnapshot {
                    audio: segment.audio,
                    shapes: segment.shapes,
                    audio_duration: segment.audio_duration,
                }));
                return;
            }
            // Terminal/empty marker: finished immediately, keep draining.
        }
    }
}
