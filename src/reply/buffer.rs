//! Sparse, index-ordered holding area for inbound reply segments.

use std::collections::BTreeMap;

use super::ReplySegment;

/// Maps segment index to segment. Gaps are allowed while segments are in
/// flight; a turn's total segment count is unknown until its terminal
/// (zero-duration) segment arrives, so there is no capacity bound.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    segments: BTreeMap<usize, ReplySegment>,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a segment by index. A later write to the same index wins.
    pub fn put(&mut self, segment: ReplySegment) {
        self.segments.insert(segment.index, segment);
    }

    /// Look up the segment at `index`. Never blocks.
    pub fn get(&self, index: usize) -> Option<&ReplySegment> {
        self.segments.get(&index)
    }

    /// Highest index stored so far, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.segments.keys().next_back().copied()
    }

    /// Drop all state for a new turn.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn segment(index: usize, text: &str) -> ReplySegment {
        ReplySegment {
            index,
            send_count: 0,
            audio: None,
            shapes: Arc::from(Vec::new()),
            text: text.to_string(),
            audio_duration: 0.0,
        }
    }

    #[test]
    fn test_put_get_sparse() {
        let mut buf = SegmentBuffer::new();
        buf.put(segment(3, "three"));
        assert!(buf.get(0).is_none());
        assert!(buf.get(2).is_none());
        assert_eq!(buf.get(3).unwrap().text, "three");
        assert_eq!(buf.max_index(), Some(3));
    }

    #[test]
    fn test_put_same_index_last_write_wins() {
        let mut buf = SegmentBuffer::new();
        buf.put(segment(1, "first"));
        buf.put(segment(1, "second"));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.get(1).unwrap().text, "second");
    }

    #[test]
    fn test_clear() {
        let mut buf = SegmentBuffer::new();
        buf.put(segment(0, "a"));
        buf.put(segment(5, "b"));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.max_index(), None);
    }
}
