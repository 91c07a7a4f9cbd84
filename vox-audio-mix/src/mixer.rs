//! Conference mixer engine
//!
//! One [`AudioMixer`] owns a fixed table of [`MAX_CHANNELS`] channels. Each
//! pin has an optional input queue and an optional output queue. A tick
//! either does nothing, forwards the frames of the only active input
//! (bypass), or sums every active input and emits one frame per enabled
//! output.
//!
//! All state sits behind one mutex taken by the tick and by every control
//! call, so configuration never changes in the middle of a tick.

use crate::bypass::{Activity, BypassDetector};
use crate::channel::Channel;
use crate::error::{check_pin, MixerError, Result};
use crate::frame_pool::{FramePool, PoolStats};
use crate::kernel::{self, MixKernel};
use crate::ports::{InputPorts, OutputPorts};
use crate::types::*;
use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Conference audio mixer
pub struct AudioMixer {
    pub(crate) inner: Mutex<MixerInner>,
    counters: Counters,
}

pub(crate) struct MixerInner {
    pub config: MixerConfig,
    pub kernel: &'static dyn MixKernel,
    pub lifecycle: Lifecycle,
    pub channels: Box<[Channel; MAX_CHANNELS]>,
    pub inputs: InputPorts,
    pub outputs: OutputPorts,
    pub bypass: BypassDetector,
    /// Tick-scoped 32-bit sums, one lane per sample
    pub accumulator: Vec<i32>,
    pub pool: FramePool,
    pub samples_per_tick: usize,
    /// Flow-control threshold in bytes
    pub skip_threshold: usize,
    /// Exactly one output is wired and enabled
    pub single_output: bool,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    idle_ticks: AtomicU64,
    bypass_ticks: AtomicU64,
    mixed_ticks: AtomicU64,
    frames_emitted: AtomicU64,
    starved_reads: AtomicU64,
    bytes_trimmed: AtomicU64,
    pool_misses: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, value: u64) {
        if value > 0 {
            counter.fetch_add(value, Ordering::Relaxed);
        }
    }
}

/// Per-tick tallies of the summation path
#[derive(Debug, Default)]
struct MixReport {
    emitted: u64,
    starved: u64,
    trimmed: u64,
}

impl AudioMixer {
    /// Create a new mixer
    ///
    /// Fails when the requested kernel is unavailable on this CPU or does
    /// not accept the configured sample rate.
    pub fn new(config: MixerConfig) -> Result<Self> {
        let kernel = kernel::select(config.kernel, config.sample_rate)?;

        if !kernel.supports_rate(config.sample_rate) {
            return Err(MixerError::UnsupportedRate {
                rate: config.sample_rate,
                kernel: kernel.name(),
            });
        }
        if config.channels == 0 {
            return Err(MixerError::InvalidChannelCount(0));
        }

        let inner = MixerInner {
            config,
            kernel,
            lifecycle: Lifecycle::Uninitialized,
            channels: Box::new(std::array::from_fn(|_| Channel::default())),
            inputs: InputPorts::new(),
            outputs: OutputPorts::new(),
            bypass: BypassDetector::new(),
            accumulator: Vec::new(),
            pool: FramePool::empty(),
            samples_per_tick: 0,
            skip_threshold: 0,
            single_output: false,
        };

        Ok(Self {
            inner: Mutex::new(inner),
            counters: Counters::default(),
        })
    }

    /// Size every buffer for ticks of `interval_ms` milliseconds
    pub fn prepare(&self, interval_ms: u32) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.lifecycle {
            Lifecycle::Uninitialized | Lifecycle::Unprepared => {}
            state => {
                return Err(MixerError::InvalidState {
                    op: "prepare",
                    state,
                })
            }
        }

        let spt = match inner.config.samples_per_tick(interval_ms) {
            Some(spt) if spt > 0 => spt,
            _ => {
                log::warn!(
                    "prepare: tick interval of {} ms is out of range at {} Hz x {} ch",
                    interval_ms,
                    inner.config.sample_rate,
                    inner.config.channels
                );
                return Err(MixerError::InvalidTickInterval(interval_ms));
            }
        };

        inner.samples_per_tick = spt;
        inner.skip_threshold = spt * 4;
        inner.accumulator = vec![0; spt];
        for chan in inner.channels.iter_mut() {
            chan.prepare(spt);
        }
        inner.pool = FramePool::new(spt, inner.config.frame_pool_size.max(MIN_FRAME_POOL_SIZE));
        inner.bypass = BypassDetector::new();
        inner.refresh_single_output();
        inner.lifecycle = Lifecycle::Prepared;

        log::info!(
            "audio mixer prepared: {} Hz x {} ch, {} samples per tick, {} kernel",
            inner.config.sample_rate,
            inner.config.channels,
            spt,
            inner.kernel.name()
        );
        Ok(())
    }

    /// Release every buffer sized by [`prepare`](Self::prepare)
    ///
    /// The tick driver must guarantee no further ticks are delivered.
    pub fn unprepare(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.lifecycle {
            Lifecycle::Prepared | Lifecycle::Running => {}
            state => {
                return Err(MixerError::InvalidState {
                    op: "unprepare",
                    state,
                })
            }
        }

        inner.accumulator = Vec::new();
        for chan in inner.channels.iter_mut() {
            chan.unprepare();
        }
        inner.pool = FramePool::empty();
        inner.samples_per_tick = 0;
        inner.lifecycle = Lifecycle::Unprepared;

        log::info!("audio mixer unprepared");
        Ok(())
    }

    /// Run one tick at time `now`
    ///
    /// Only fails when called outside the prepared/running states; data
    /// problems on individual channels degrade to silence.
    pub fn process(&self, now: u64) -> Result<TickOutcome> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match inner.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Prepared => {
                inner.lifecycle = Lifecycle::Running;
                log::debug!("audio mixer running");
            }
            state => {
                return Err(MixerError::InvalidState {
                    op: "process",
                    state,
                })
            }
        }

        self.counters.ticks.fetch_add(1, Ordering::Relaxed);

        let activity = inner.bypass.scan(&inner.inputs, &mut inner.channels[..], now);
        inner.bypass.update(activity);

        let outcome = match activity {
            Activity::Idle => {
                self.counters.idle_ticks.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Idle
            }
            Activity::Single { pin } => {
                let emitted = inner.forward(pin);
                Counters::add(&self.counters.frames_emitted, emitted);
                self.counters.bypass_ticks.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Bypass { source: pin }
            }
            Activity::Multiple { count } => {
                log::trace!("mixing {} active inputs", count);
                let misses = inner.pool.misses();
                let report = inner.mix(now);
                Counters::add(&self.counters.frames_emitted, report.emitted);
                Counters::add(&self.counters.starved_reads, report.starved);
                Counters::add(&self.counters.bytes_trimmed, report.trimmed);
                Counters::add(&self.counters.pool_misses, inner.pool.misses() - misses);
                self.counters.mixed_ticks.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Mixed
            }
        };

        Ok(outcome)
    }

    /// Wire an input pin; frames sent on the returned sender are mixed
    pub fn connect_input(&self, pin: usize) -> Result<Sender<Frame>> {
        check_pin(pin, "connect_input")?;
        let mut inner = self.inner.lock();
        inner.channels[pin].reset_input();
        Ok(inner.inputs.connect(pin))
    }

    /// Unwire an input pin, discarding audio still buffered for it
    pub fn disconnect_input(&self, pin: usize) -> Result<bool> {
        check_pin(pin, "disconnect_input")?;
        let mut inner = self.inner.lock();
        inner.channels[pin].reset_input();
        Ok(inner.inputs.disconnect(pin))
    }

    /// Wire an output pin; mixed frames arrive on the returned receiver
    pub fn connect_output(&self, pin: usize) -> Result<Receiver<Frame>> {
        check_pin(pin, "connect_output")?;
        let mut inner = self.inner.lock();
        let rx = inner.outputs.connect(pin);
        inner.refresh_single_output();
        Ok(rx)
    }

    pub fn disconnect_output(&self, pin: usize) -> Result<bool> {
        check_pin(pin, "disconnect_output")?;
        let mut inner = self.inner.lock();
        let was_connected = inner.outputs.disconnect(pin);
        inner.refresh_single_output();
        Ok(was_connected)
    }

    pub fn state(&self) -> Lifecycle {
        self.inner.lock().lifecycle
    }

    pub fn is_bypassing(&self) -> bool {
        self.inner.lock().bypass.is_bypassing()
    }

    /// Samples per tick, once prepared
    pub fn samples_per_tick(&self) -> Option<usize> {
        let inner = self.inner.lock();
        (inner.samples_per_tick > 0).then_some(inner.samples_per_tick)
    }

    pub fn kernel_name(&self) -> &'static str {
        self.inner.lock().kernel.name()
    }

    /// Bytes waiting in the elastic buffer of `pin`
    pub fn buffered_bytes(&self, pin: usize) -> Result<usize> {
        check_pin(pin, "buffered_bytes")?;
        Ok(self.inner.lock().channels[pin].buffer.available_bytes())
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.lock().pool.stats()
    }

    /// Get mixer statistics
    pub fn stats(&self) -> MixerStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MixerStats {
            ticks: load(&self.counters.ticks),
            idle_ticks: load(&self.counters.idle_ticks),
            bypass_ticks: load(&self.counters.bypass_ticks),
            mixed_ticks: load(&self.counters.mixed_ticks),
            frames_emitted: load(&self.counters.frames_emitted),
            starved_reads: load(&self.counters.starved_reads),
            bytes_trimmed: load(&self.counters.bytes_trimmed),
            pool_misses: load(&self.counters.pool_misses),
        }
    }
}

/// Whether bypass forwarding from `source` reaches output `out`
fn forwards_to(
    channels: &[Channel],
    outputs: &OutputPorts,
    out: usize,
    source: usize,
    conference: bool,
) -> bool {
    outputs.is_connected(out) && channels[out].output_enabled && !(conference && out == source)
}

impl MixerInner {
    pub fn refresh_single_output(&mut self) {
        let enabled = (0..MAX_CHANNELS)
            .filter(|&pin| self.outputs.is_connected(pin) && self.channels[pin].output_enabled)
            .count();
        self.single_output = enabled == 1;
    }

    /// Bypass: hand every queued frame of `source` to the outputs as-is
    ///
    /// A lone output gets the frames moved; several outputs each get a
    /// clone. The input queue is always left empty.
    fn forward(&mut self, source: usize) -> u64 {
        let Some(queue) = self.inputs.get(source) else {
            return 0;
        };
        let conference = self.config.conference_mode;
        let mut emitted = 0;
        let mut pruned = false;

        if self.single_output {
            let target = (0..MAX_CHANNELS)
                .find(|&out| forwards_to(&self.channels[..], &self.outputs, out, source, conference));

            for frame in queue.try_iter() {
                let Some(out) = target else {
                    continue;
                };
                if self.outputs.send(out, frame) {
                    emitted += 1;
                } else {
                    pruned = true;
                }
            }
        } else {
            for frame in queue.try_iter() {
                for out in 0..MAX_CHANNELS {
                    if !forwards_to(&self.channels[..], &self.outputs, out, source, conference) {
                        continue;
                    }
                    if self.outputs.send(out, frame.clone()) {
                        emitted += 1;
                    } else {
                        pruned = true;
                    }
                }
            }
        }

        if pruned {
            self.refresh_single_output();
        }
        emitted
    }

    /// Full path: sum every active input, then emit per enabled output
    fn mix(&mut self, now: u64) -> MixReport {
        let kernel = self.kernel;
        let conference = self.config.conference_mode;
        let mut report = MixReport::default();

        self.accumulator.fill(0);
        for chan in self.channels.iter_mut() {
            chan.contributed = false;
        }

        for pin in 0..MAX_CHANNELS {
            let Some(queue) = self.inputs.get(pin) else {
                continue;
            };
            let chan = &mut self.channels[pin];

            chan.ingest(queue);
            if chan.read_tick_block() {
                if chan.active {
                    kernel.accumulate(&mut self.accumulator, &chan.contribution);
                    chan.contributed = true;
                }
            } else {
                report.starved += 1;
            }

            let trimmed = chan.flow.run(&mut chan.buffer, self.skip_threshold, now);
            if trimmed > 0 {
                log::debug!("flow control trimmed {} bytes on pin {}", trimmed, pin);
                report.trimmed += trimmed as u64;
            }
        }

        let sum = &self.accumulator[..];
        let mut generic: Option<Frame> = None;
        let mut pruned = false;

        for out in 0..MAX_CHANNELS {
            let chan = &self.channels[out];
            if !self.outputs.is_connected(out) || !chan.output_enabled {
                continue;
            }

            let frame = if conference && chan.contributed {
                let own = &chan.contribution[..];
                self.pool
                    .fill(now, |buf| kernel.mix_out_excluding(buf, sum, own))
            } else if let Some(shared) = &generic {
                shared.clone()
            } else {
                let shared = self.pool.fill(now, |buf| kernel.mix_out(buf, sum));
                generic = Some(shared.clone());
                shared
            };

            if self.outputs.send(out, frame) {
                report.emitted += 1;
            } else {
                pruned = true;
            }
        }

        if pruned {
            self.refresh_single_output();
        }
        report
    }
}

/// Mixer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerStats {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub bypass_ticks: u64,
    pub mixed_ticks: u64,
    pub frames_emitted: u64,
    /// Reads that found less than one tick of audio buffered
    pub starved_reads: u64,
    pub bytes_trimmed: u64,
    pub pool_misses: u64,
}
