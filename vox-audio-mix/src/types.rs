//! Mixer data types

use std::fmt;
use std::sync::Arc;

/// Capacity of the channel table (input and output pins)
pub const MAX_CHANNELS: usize = 128;

/// Time units an idle input still counts as active after its last frame
pub const BYPASS_MODE_TIMEOUT: u64 = 1000;

/// Length of one flow-control observation window, in time units
pub const FLOW_CONTROL_WINDOW: u64 = 5000;

/// Bytes per PCM16 sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Largest tick `prepare` accepts, in samples
pub const MAX_SAMPLES_PER_TICK: usize = 1 << 18;

/// Output buffers one full tick can hold: a self-excluded frame per
/// output plus the shared generic mix
pub const MIN_FRAME_POOL_SIZE: usize = MAX_CHANNELS + 1;

/// Mix kernel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelChoice {
    /// AVX2 when the CPU supports it and the sample rate is narrowband or
    /// wideband, scalar otherwise
    #[default]
    Auto,
    Scalar,
    Avx2,
}

/// Mixer configuration
#[derive(Debug, Clone, Copy)]
pub struct MixerConfig {
    pub sample_rate: u32,
    /// Interleaved channels per frame; only scales samples-per-tick
    pub channels: u32,
    pub conference_mode: bool,
    pub kernel: KernelChoice,
    /// Number of preallocated output buffers, raised to at least
    /// [`MIN_FRAME_POOL_SIZE`] at `prepare`
    pub frame_pool_size: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            conference_mode: false,
            kernel: KernelChoice::Auto,
            frame_pool_size: 2 * MIN_FRAME_POOL_SIZE,
        }
    }
}

impl MixerConfig {
    /// Samples handled per tick for a given tick interval
    ///
    /// `None` when the product overflows or exceeds
    /// [`MAX_SAMPLES_PER_TICK`].
    pub fn samples_per_tick(&self, interval_ms: u32) -> Option<usize> {
        let samples = u64::from(self.channels)
            .checked_mul(u64::from(self.sample_rate))?
            .checked_mul(u64::from(interval_ms))?
            / 1000;

        usize::try_from(samples)
            .ok()
            .filter(|&spt| spt <= MAX_SAMPLES_PER_TICK)
    }
}

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Prepared,
    Running,
    Unprepared,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No input contributed; nothing was emitted
    Idle,
    /// Frames of the only active input were forwarded as-is
    Bypass { source: usize },
    /// Inputs were summed and one frame emitted per enabled output
    Mixed,
}

/// Immutable mono PCM16 frame
///
/// Backed by a reference-counted buffer, so clones share samples.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub(crate) samples: Arc<[i16]>,
    pub timestamp: u64,
}

impl Frame {
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into(),
            timestamp: 0,
        }
    }

    /// Build a frame from native-endian raw PCM; a trailing odd byte is dropped
    pub fn from_pcm_bytes(bytes: &[u8]) -> Self {
        let even = bytes.len() - bytes.len() % BYTES_PER_SAMPLE;
        Self::from_samples(bytemuck::pod_collect_to_vec::<u8, i16>(&bytes[..even]))
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples[..])
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether two frames share the same buffer
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("samples", &self.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}
