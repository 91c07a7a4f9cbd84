//! Per-pin channel state: elastic input buffer and drift-correcting flow control

use crate::types::{Frame, BYTES_PER_SAMPLE, FLOW_CONTROL_WINDOW};
use crossbeam::channel::Receiver;
use std::collections::VecDeque;

/// Elastic buffer absorbing arrival jitter between a producer and the tick
///
/// Accepts frames of any length and hands them out in fixed tick-sized
/// blocks. Fullness is measured in bytes of PCM16.
#[derive(Debug, Default)]
pub struct ChannelBuffer {
    samples: VecDeque<i16>,
}

impl ChannelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame of arbitrary length
    pub fn enqueue(&mut self, frame: &Frame) {
        self.samples.extend(frame.samples().iter().copied());
    }

    /// Fill `out` with the next tick block
    ///
    /// Returns `false` and zeroes `out` when fewer than `out.len()` samples
    /// are buffered; buffered data is then left untouched.
    pub fn drain_tick_block(&mut self, out: &mut [i16]) -> bool {
        if self.samples.len() < out.len() {
            out.fill(0);
            return false;
        }

        let n = out.len();
        for (dst, src) in out.iter_mut().zip(self.samples.drain(..n)) {
            *dst = src;
        }
        true
    }

    pub fn available_bytes(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }

    /// Drop up to `bytes` of the oldest buffered audio, returns bytes dropped
    pub fn skip_bytes(&mut self, bytes: usize) -> usize {
        let count = (bytes / BYTES_PER_SAMPLE).min(self.samples.len());
        self.samples.drain(..count);
        count * BYTES_PER_SAMPLE
    }

    pub(crate) fn reserve_samples(&mut self, samples: usize) {
        self.samples.reserve(samples);
    }

    /// Drop buffered audio, keeping the allocation
    pub(crate) fn clear(&mut self) {
        self.samples.clear();
    }

    pub(crate) fn release(&mut self) {
        self.samples.clear();
        self.samples.shrink_to_fit();
    }
}

/// Flow-control window tracking the minimum fullness of one buffer
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowControl {
    window_start: Option<u64>,
    min_fullness: Option<usize>,
}

impl FlowControl {
    /// Run one flow-control step after the tick block was drained
    ///
    /// When a full window has elapsed and the buffer never dropped below
    /// `threshold` bytes, the excess down to `threshold / 2` is trimmed.
    /// Returns the number of bytes trimmed.
    pub fn run(&mut self, buffer: &mut ChannelBuffer, threshold: usize, now: u64) -> usize {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            self.min_fullness = None;
            return 0;
        };

        let size = buffer.available_bytes();
        let min = self.min_fullness.map_or(size, |min| min.min(size));
        self.min_fullness = Some(min);

        if now.saturating_sub(start) < FLOW_CONTROL_WINDOW {
            return 0;
        }

        let mut trimmed = 0;
        if min >= threshold {
            trimmed = buffer.skip_bytes(min - threshold / 2);
        }
        self.window_start = Some(now);
        self.min_fullness = None;
        trimmed
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One slot of the fixed channel table
#[derive(Debug)]
pub(crate) struct Channel {
    pub buffer: ChannelBuffer,
    /// Tick block read this tick; zeroed on underrun
    pub contribution: Vec<i16>,
    pub flow: FlowControl,
    pub active: bool,
    pub output_enabled: bool,
    /// Whether this channel was summed into the current tick
    pub contributed: bool,
    pub last_activity: Option<u64>,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            buffer: ChannelBuffer::new(),
            contribution: Vec::new(),
            flow: FlowControl::default(),
            active: true,
            output_enabled: true,
            contributed: false,
            last_activity: None,
        }
    }
}

impl Channel {
    pub fn prepare(&mut self, samples_per_tick: usize) {
        self.contribution = vec![0; samples_per_tick];
        // Twice the flow-control threshold before the buffer has to grow
        self.buffer.reserve_samples(samples_per_tick * 4);
        self.flow.reset();
        self.contributed = false;
        self.last_activity = None;
    }

    pub fn unprepare(&mut self) {
        self.contribution = Vec::new();
        self.buffer.release();
        self.contributed = false;
    }

    /// Forget everything the previous producer left behind
    pub fn reset_input(&mut self) {
        self.buffer.clear();
        self.contribution.fill(0);
        self.flow.reset();
        self.contributed = false;
        self.last_activity = None;
    }

    /// Move every pending frame of the input queue into the elastic buffer
    pub fn ingest(&mut self, queue: &Receiver<Frame>) {
        for frame in queue.try_iter() {
            self.buffer.enqueue(&frame);
        }
    }

    /// Read this tick's block into the contribution buffer
    pub fn read_tick_block(&mut self) -> bool {
        self.buffer.drain_tick_block(&mut self.contribution)
    }
}
