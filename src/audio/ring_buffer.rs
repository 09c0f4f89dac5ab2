//! Lock-free SPSC ring buffer for captured audio samples.
//!
//! Passes f32 samples from the cpal callback thread to the recording
//! controller without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~60 seconds of 16 kHz mono audio. Recordings are
/// held entirely in the ring until the user stops, so this bounds the
/// longest utterance we keep.
const DEFAULT_CAPACITY: usize = 960_000;

/// Producer half — lives in the cpal audio callback thread.
pub struct AudioProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half — lives with the recording controller.
pub struct AudioConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair backed by a lock-free ring buffer.
pub fn audio_ring_buffer(capacity: Option<usize>) -> (AudioProducer, AudioConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (AudioProducer { inner: prod }, AudioConsumer { inner: cons })
}

impl AudioProducer {
    /// Push a slice of samples. Returns the number actually written
    /// (less than `samples.len()` when the buffer is full).
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: the ringbuf producer is designed to be used from a single thread.
// cpal callbacks run on a dedicated audio thread, so this is fine.
unsafe impl Send for AudioProducer {}

impl AudioConsumer {
    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain all available samples into a Vec.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

unsafe impl Send for AudioConsumer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_then_drain() {
        let (mut prod, mut cons) = audio_ring_buffer(Some(8));
        assert_eq!(prod.push_slice(&[0.1, 0.2, 0.3]), 3);
        let drained = cons.drain_all();
        assert_eq!(drained, vec![0.1, 0.2, 0.3]);
        assert!(cons.drain_all().is_empty());
    }

    #[test]
    fn test_full_buffer_drops_overflow() {
        let (mut prod, mut cons) = audio_ring_buffer(Some(4));
        let written = prod.push_slice(&[1.0; 6]);
        assert_eq!(written, 4);
        assert_eq!(cons.drain_all().len(), 4);
    }
}
