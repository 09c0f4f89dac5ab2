//! Viseme renderer: drives morph target weights off wall-clock time.
//!
//! While a segment is active, frames are advanced at the authored 60 Hz
//! cadence measured against the playback-start timestamp, so late ticks
//! catch up and slow UIs never drift out of sync with the audio. When
//! elapsed time passes the segment's declared audio duration the renderer
//! reports [`TickSignal::SegmentFinished`]; the driving loop uses that to
//! pull the next segment, rather than listening to the audio device.
//!
//! Between segments an idle blink animation runs on the two eye channels.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::avatar::shapes::{MorphTargetSink, SHAPE_FRAME_RATE};
use crate::reply::RenderSnapshot;

/// Marks "no active shape sequence". Also set when playback fails so the
/// stale frames are never applied.
const NO_SEQUENCE: usize = usize::MAX;

// Idle blink timing, in milliseconds.
const BLINK_INTERVAL_MIN_MS: u64 = 1_000;
const BLINK_INTERVAL_MAX_MS: u64 = 5_000;
const BLINK_CLOSED_MIN_MS: u64 = 150;
const BLINK_CLOSED_MAX_MS: u64 = 350;
const BLINK_LERP: f32 = 0.5;

/// What a render tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSignal {
    /// The active segment's audio duration has elapsed.
    SegmentFinished,
}

/// Small xorshift PRNG for blink jitter. Not statistical-grade, doesn't
/// need to be.
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn millis_between(&mut self, lo: u64, hi: u64) -> Duration {
        Duration::from_millis(lo + self.next() % (hi - lo))
    }
}

enum BlinkPhase {
    Open,
    Closed,
}

struct BlinkState {
    phase: BlinkPhase,
    /// When the current phase ends.
    phase_ends: Instant,
    weight: f32,
    rng: XorShift,
}

impl BlinkState {
    fn new(now: Instant, seed: u64) -> Self {
        let mut rng = XorShift::new(seed);
        let first = rng.millis_between(BLINK_INTERVAL_MIN_MS, BLINK_INTERVAL_MAX_MS);
        Self {
            phase: BlinkPhase::Open,
            phase_ends: now + first,
            weight: 0.0,
            rng,
        }
    }

    /// Advance the blink animation and return the eased eyelid weight.
    fn tick(&mut self, now: Instant) -> f32 {
        if now >= self.phase_ends {
            match self.phase {
                BlinkPhase::Open => {
                    self.phase = BlinkPhase::Closed;
                    self.phase_ends = now
                        + self
                            .rng
                            .millis_between(BLINK_CLOSED_MIN_MS, BLINK_CLOSED_MAX_MS);
                }
                BlinkPhase::Closed => {
                    self.phase = BlinkPhase::Open;
                    self.phase_ends = now
                        + self
                            .rng
                            .millis_between(BLINK_INTERVAL_MIN_MS, BLINK_INTERVAL_MAX_MS);
                }
            }
        }
        let target = match self.phase {
            BlinkPhase::Open => 0.0,
            BlinkPhase::Closed => 1.0,
        };
        self.weight += (target - self.weight) * BLINK_LERP;
        self.weight
    }
}

/// Applies viseme frames to a [`MorphTargetSink`] in lockstep with audio
/// playback time.
pub struct VisemeRenderer {
    snapshot: Arc<RenderSnapshot>,
    started_at: Option<Instant>,
    frame_cursor: usize,
    blink: BlinkState,
}

impl VisemeRenderer {
    pub fn new(now: Instant) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e3779b9);
        Self::with_seed(now, seed)
    }

    /// Deterministic constructor for tests.
    pub fn with_seed(now: Instant, seed: u64) -> Self {
        Self {
            snapshot: Arc::new(RenderSnapshot::empty()),
            started_at: None,
            frame_cursor: NO_SEQUENCE,
            blink: BlinkState::new(now, seed),
        }
    }

    /// True while a segment's shape sequence is being driven.
    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Start driving a segment's frames, with `now` as the playback-start
    /// timestamp that all frame timing is measured against.
    pub fn begin_segment(&mut self, snapshot: Arc<RenderSnapshot>, now: Instant) {
        debug!(
            frames = snapshot.shapes.len(),
            duration = snapshot.audio_duration,
            "Segment render started"
        );
        self.snapshot = snapshot;
        self.started_at = Some(now);
        self.frame_cursor = 0;
    }

    /// Playback never started (device failure, missing audio): drop the
    /// segment without ever reporting it finished.
    pub fn abandon_segment(&mut self) {
        self.snapshot = Arc::new(RenderSnapshot::empty());
        self.started_at = None;
        self.frame_cursor = NO_SEQUENCE;
    }

    /// Drop any active segment and return the face to neutral.
    pub fn clear(&mut self, sink: &mut dyn MorphTargetSink) {
        self.abandon_segment();
        sink.neutral_pose();
    }

    /// Advance the animation to `now`. Applies every frame that has come
    /// due since the last tick; when no segment is active, runs the idle
    /// blink instead.
    pub fn tick(&mut self, sink: &mut dyn MorphTargetSink, now: Instant) -> Option<TickSignal> {
        let Some(started_at) = self.started_at else {
            let weight = self.blink.tick(now);
            sink.set_blink(weight);
            return None;
        };

        let elapsed = now.saturating_duration_since(started_at).as_secs_f64();
        if elapsed >= self.snapshot.audio_duration {
            debug!(elapsed, "Segment render finished");
            self.abandon_segment();
            return Some(TickSignal::SegmentFinished);
        }

        let due = (elapsed * SHAPE_FRAME_RATE) as usize;
        while self.frame_cursor < due && self.frame_cursor < self.snapshot.shapes.len() {
            sink.apply_frame(self.snapshot.shapes[self.frame_cursor].weights());
            self.frame_cursor += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::shapes::{VisemeFrame, SHAPE_CHANNELS};

    #[derive(Default)]
    struct MockSink {
        frames: Vec<[f32; SHAPE_CHANNELS]>,
        blinks: Vec<f32>,
        neutral_calls: usize,
    }

    impl MorphTargetSink for MockSink {
        fn apply_frame(&mut self, weights: &[f32; SHAPE_CHANNELS]) {
            self.frames.push(*weights);
        }

        fn set_blink(&mut self, weight: f32) {
            self.blinks.push(weight);
        }

        fn neutral_pose(&mut self) {
            self.neutral_calls += 1;
        }
    }

    fn snapshot(frames: usize, duration: f64) -> Arc<RenderSnapshot> {
        let shapes: Vec<VisemeFrame> = (0..frames)
            .map(|i| {
                let mut w = [0.0f32; SHAPE_CHANNELS];
                w[0] = i as f32;
                VisemeFrame(w)
            })
            .collect();
        Arc::new(RenderSnapshot {
            audio: None,
            shapes: shapes.into(),
            audio_duration: duration,
        })
    }

    #[test]
    fn test_frames_advance_at_sixty_hz() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        r.begin_segment(snapshot(120, 2.0), t0);
        r.tick(&mut sink, t0 + Duration::from_millis(100));
        // 100 ms at 60 Hz is 6 frames.
        assert_eq!(sink.frames.len(), 6);
        assert_eq!(sink.frames[0][0], 0.0);
        assert_eq!(sink.frames[5][0], 5.0);
    }

    #[test]
    fn test_late_tick_catches_up() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        r.begin_segment(snapshot(120, 2.0), t0);
        r.tick(&mut sink, t0 + Duration::from_millis(16));
        let after_first = sink.frames.len();
        // Long stall, then one tick: every missed frame is applied.
        r.tick(&mut sink, t0 + Duration::from_millis(500));
        assert_eq!(sink.frames.len(), 30);
        assert!(after_first < 30);
    }

    #[test]
    fn test_finishes_exactly_once_at_duration() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        r.begin_segment(snapshot(60, 1.0), t0);
        assert_eq!(r.tick(&mut sink, t0 + Duration::from_millis(999)), None);
        assert_eq!(
            r.tick(&mut sink, t0 + Duration::from_millis(1001)),
            Some(TickSignal::SegmentFinished)
        );
        assert!(!r.is_active());
        // Further ticks fall through to the idle blink, no second signal.
        assert_eq!(r.tick(&mut sink, t0 + Duration::from_millis(1100)), None);
    }

    #[test]
    fn test_short_shape_list_still_finishes() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        // Only 10 frames authored for a 1 s segment; the cursor parks at
        // the end and the segment still finishes on time.
        r.begin_segment(snapshot(10, 1.0), t0);
        r.tick(&mut sink, t0 + Duration::from_millis(900));
        assert_eq!(sink.frames.len(), 10);
        assert_eq!(
            r.tick(&mut sink, t0 + Duration::from_millis(1001)),
            Some(TickSignal::SegmentFinished)
        );
    }

    #[test]
    fn test_abandoned_segment_never_finishes() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        r.begin_segment(snapshot(60, 1.0), t0);
        r.abandon_segment();
        assert_eq!(r.tick(&mut sink, t0 + Duration::from_secs(5)), None);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_clear_restores_neutral_pose() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 7);
        let mut sink = MockSink::default();

        r.begin_segment(snapshot(60, 1.0), t0);
        r.clear(&mut sink);
        assert_eq!(sink.neutral_calls, 1);
        assert!(!r.is_active());
    }

    #[test]
    fn test_idle_blink_closes_and_reopens() {
        let t0 = Instant::now();
        let mut r = VisemeRenderer::with_seed(t0, 42);
        let mut sink = MockSink::default();

        // Tick well past the longest possible interval so a blink fires,
        // then keep ticking through the closed phase.
        for ms in (0..12_000).step_by(16) {
            r.tick(&mut sink, t0 + Duration::from_millis(ms));
        }
        // The first blink must land well inside 12 s, and the eyes must
        // open again afterwards.
        let closed_at = sink
            .blinks
            .iter()
            .position(|&w| w > 0.9)
            .expect("eyelids never closed");
        assert!(sink.blinks[closed_at..].iter().any(|&w| w < 0.1));
        assert!(sink.frames.is_empty());
    }
}
