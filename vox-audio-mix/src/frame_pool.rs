//! Pool of preallocated output buffers to keep allocation out of the tick

use crate::types::Frame;
use std::sync::Arc;

/// Pool of tick-sized PCM buffers handed out as [`Frame`]s
///
/// A buffer returns to the pool by itself once every consumer has dropped
/// its frame: the pool then holds the only reference and may write to it
/// again. When every buffer is still held downstream a fresh one is
/// allocated and counted as a miss.
pub struct FramePool {
    slots: Vec<Arc<[i16]>>,
    frame_len: usize,
    cursor: usize,
    misses: u64,
}

impl FramePool {
    /// Create a new frame pool
    ///
    /// # Arguments
    /// * `frame_len` - Samples per frame (samples-per-tick)
    /// * `capacity` - Number of buffers to pre-allocate
    pub fn new(frame_len: usize, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Arc::from(vec![0i16; frame_len]))
            .collect();

        Self {
            slots,
            frame_len,
            cursor: 0,
            misses: 0,
        }
    }

    /// A pool without buffers (before prepare / after unprepare)
    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Frames allocated outside the pool so far
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Let `write` fill a free buffer and wrap it as a frame
    ///
    /// `write` receives exactly `frame_len` samples and must overwrite all
    /// of them; reused buffers hold the previous tick's data.
    pub fn fill(&mut self, timestamp: u64, write: impl FnOnce(&mut [i16])) -> Frame {
        let capacity = self.slots.len();

        for step in 0..capacity {
            let idx = (self.cursor + step) % capacity;
            if let Some(buf) = Arc::get_mut(&mut self.slots[idx]) {
                write(buf);
                self.cursor = (idx + 1) % capacity;
                return Frame {
                    samples: Arc::clone(&self.slots[idx]),
                    timestamp,
                };
            }
        }

        self.misses += 1;
        log::debug!(
            "frame pool exhausted ({} buffers in flight), allocating",
            capacity
        );
        let mut fresh = vec![0i16; self.frame_len];
        write(&mut fresh);
        Frame::from_samples(fresh).with_timestamp(timestamp)
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let in_use = self
            .slots
            .iter()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count();

        PoolStats {
            capacity: self.slots.len(),
            in_use,
            available: self.slots.len() - in_use,
            misses: self.misses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
    pub misses: u64,
}
