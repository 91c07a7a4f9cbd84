//! VOX FFI - C Foreign Function Interface
//!
//! Provides a C-compatible API for embedding the conference mixer in a
//! C media graph. The handle owns the sending end of every wired input pin
//! and the receiving end of every wired output pin; C code moves PCM16
//! samples in and out through `vox_mixer_push_input` and
//! `vox_mixer_pull_output`.

use std::os::raw::{c_char, c_int, c_uint};
use std::ptr;

use crossbeam::channel::{Receiver, Sender};
use parking_lot::Mutex;
use vox_audio_mix::{
    AudioMixer, Frame, KernelChoice, MixerConfig, Result, TickOutcome, MAX_CHANNELS,
};

/// Opaque handle to a mixer (C-compatible)
pub struct VoxMixer {
    mixer: AudioMixer,
    inputs: Mutex<Vec<Option<Sender<Frame>>>>,
    outputs: Mutex<Vec<Option<Receiver<Frame>>>>,
}

/// C-compatible mixer config
///
/// `kernel`: 0 = auto, 1 = scalar, 2 = avx2. A `frame_pool_size` of 0
/// keeps the default.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VoxMixerConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub conference_mode: c_int,
    pub kernel: u32,
    pub frame_pool_size: u32,
}

pub const VOX_TICK_ERROR: c_int = -1;
pub const VOX_TICK_IDLE: c_int = 0;
pub const VOX_TICK_BYPASS: c_int = 1;
pub const VOX_TICK_MIXED: c_int = 2;

impl VoxMixerConfig {
    fn to_config(self) -> Option<MixerConfig> {
        let kernel = match self.kernel {
            0 => KernelChoice::Auto,
            1 => KernelChoice::Scalar,
            2 => KernelChoice::Avx2,
            other => {
                log::warn!("vox_mixer_create: unknown kernel id {}", other);
                return None;
            }
        };
        let defaults = MixerConfig::default();

        Some(MixerConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            conference_mode: self.conference_mode != 0,
            kernel,
            frame_pool_size: match self.frame_pool_size {
                0 => defaults.frame_pool_size,
                n => n as usize,
            },
        })
    }
}

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

unsafe fn handle<'a>(ptr: *const VoxMixer) -> Option<&'a VoxMixer> {
    ptr.as_ref()
}

// ============================================================================
// LIFECYCLE API
// ============================================================================

/// Create a new mixer; a null `config` selects the defaults
///
/// Returns null when the config is rejected.
///
/// # Safety
/// `config` must be null or point to a valid `VoxMixerConfig`.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_create(config: *const VoxMixerConfig) -> *mut VoxMixer {
    let config = match config.as_ref() {
        None => MixerConfig::default(),
        Some(c) => match c.to_config() {
            Some(config) => config,
            None => return ptr::null_mut(),
        },
    };

    let mixer = match AudioMixer::new(config) {
        Ok(mixer) => mixer,
        Err(e) => {
            log::warn!("vox_mixer_create: {}", e);
            return ptr::null_mut();
        }
    };

    let handle = Box::new(VoxMixer {
        mixer,
        inputs: Mutex::new(vec![None; MAX_CHANNELS]),
        outputs: Mutex::new(vec![None; MAX_CHANNELS]),
    });
    Box::into_raw(handle)
}

/// Destroy mixer
///
/// # Safety
/// Caller must ensure ptr is valid and not already freed.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_destroy(ptr: *mut VoxMixer) {
    if !ptr.is_null() {
        let _ = Box::from_raw(ptr);
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_prepare(ptr: *const VoxMixer, interval_ms: c_uint) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.prepare(interval_ms)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_unprepare(ptr: *const VoxMixer) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.unprepare()),
        None => -1,
    }
}

/// Run one tick at `tick_time`
///
/// Returns one of the `VOX_TICK_*` codes.
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_process(ptr: *const VoxMixer, tick_time: u64) -> c_int {
    let Some(h) = handle(ptr) else {
        return VOX_TICK_ERROR;
    };

    match h.mixer.process(tick_time) {
        Ok(TickOutcome::Idle) => VOX_TICK_IDLE,
        Ok(TickOutcome::Bypass { .. }) => VOX_TICK_BYPASS,
        Ok(TickOutcome::Mixed) => VOX_TICK_MIXED,
        Err(e) => {
            log::warn!("vox_mixer_process: {}", e);
            VOX_TICK_ERROR
        }
    }
}

// ============================================================================
// CONTROL API
// ============================================================================

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_sample_rate(ptr: *const VoxMixer, rate: c_uint) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_sample_rate(rate)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_channel_count(
    ptr: *const VoxMixer,
    channels: c_uint,
) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_channel_count(channels)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_active(
    ptr: *const VoxMixer,
    pin: c_uint,
    active: c_int,
) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_active(pin as usize, active != 0)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_output_enabled(
    ptr: *const VoxMixer,
    pin: c_uint,
    enabled: c_int,
) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_output_enabled(pin as usize, enabled != 0)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_conference_mode(
    ptr: *const VoxMixer,
    enabled: c_int,
) -> c_int {
    match handle(ptr) {
        Some(h) => {
            h.mixer.set_conference_mode(enabled != 0);
            0
        }
        None => -1,
    }
}

/// Always fails: per-input gain is not supported
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_input_gain(
    ptr: *const VoxMixer,
    pin: c_uint,
    gain: f32,
) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_input_gain(pin as usize, gain)),
        None => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_set_master_channel(ptr: *const VoxMixer, pin: c_uint) -> c_int {
    match handle(ptr) {
        Some(h) => status(h.mixer.set_master_channel(pin as usize)),
        None => -1,
    }
}

// ============================================================================
// PIN WIRING API
// ============================================================================

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_connect_input(ptr: *const VoxMixer, pin: c_uint) -> c_int {
    let Some(h) = handle(ptr) else {
        return -1;
    };

    match h.mixer.connect_input(pin as usize) {
        Ok(tx) => {
            h.inputs.lock()[pin as usize] = Some(tx);
            0
        }
        Err(_) => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_disconnect_input(ptr: *const VoxMixer, pin: c_uint) -> c_int {
    let Some(h) = handle(ptr) else {
        return -1;
    };

    match h.mixer.disconnect_input(pin as usize) {
        Ok(_) => {
            h.inputs.lock()[pin as usize] = None;
            0
        }
        Err(_) => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_connect_output(ptr: *const VoxMixer, pin: c_uint) -> c_int {
    let Some(h) = handle(ptr) else {
        return -1;
    };

    match h.mixer.connect_output(pin as usize) {
        Ok(rx) => {
            h.outputs.lock()[pin as usize] = Some(rx);
            0
        }
        Err(_) => -1,
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_disconnect_output(ptr: *const VoxMixer, pin: c_uint) -> c_int {
    let Some(h) = handle(ptr) else {
        return -1;
    };

    match h.mixer.disconnect_output(pin as usize) {
        Ok(_) => {
            h.outputs.lock()[pin as usize] = None;
            0
        }
        Err(_) => -1,
    }
}

// ============================================================================
// SAMPLE I/O API
// ============================================================================

/// Queue `len` PCM16 samples on an input pin
///
/// # Safety
/// Caller must ensure ptr is valid and `samples` points to `len` samples.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_push_input(
    ptr: *const VoxMixer,
    pin: c_uint,
    samples: *const i16,
    len: usize,
) -> c_int {
    let Some(h) = handle(ptr) else {
        return -1;
    };
    if samples.is_null() && len > 0 {
        return -1;
    }

    let inputs = h.inputs.lock();
    let Some(Some(tx)) = inputs.get(pin as usize) else {
        log::warn!("vox_mixer_push_input: pin {} is not wired", pin);
        return -1;
    };

    let data = if len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(samples, len).to_vec()
    };

    match tx.send(Frame::from_samples(data)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Take the next frame queued on an output pin
///
/// Returns the number of samples written, 0 when nothing is queued, or -1
/// on error. A frame larger than `cap` is truncated.
///
/// # Safety
/// Caller must ensure ptr is valid and `out` has room for `cap` samples.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_pull_output(
    ptr: *const VoxMixer,
    pin: c_uint,
    out: *mut i16,
    cap: usize,
) -> libc::ssize_t {
    let Some(h) = handle(ptr) else {
        return -1;
    };
    if out.is_null() && cap > 0 {
        return -1;
    }

    let outputs = h.outputs.lock();
    let Some(Some(rx)) = outputs.get(pin as usize) else {
        return -1;
    };

    let Ok(frame) = rx.try_recv() else {
        return 0;
    };

    let samples = frame.samples();
    if samples.len() > cap {
        log::warn!(
            "vox_mixer_pull_output: truncating {} samples to {} on pin {}",
            samples.len(),
            cap,
            pin
        );
    }

    let n = samples.len().min(cap);
    if n > 0 {
        std::slice::from_raw_parts_mut(out, n).copy_from_slice(&samples[..n]);
    }
    n as libc::ssize_t
}

// ============================================================================
// UTILITY FUNCTIONS
// ============================================================================

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn vox_mixer_is_bypassing(ptr: *const VoxMixer) -> c_int {
    match handle(ptr) {
        Some(h) => h.mixer.is_bypassing() as c_int,
        None => 0,
    }
}

/// Get library version string
#[no_mangle]
pub extern "C" fn vox_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Check if AVX2 is available
#[no_mangle]
pub extern "C" fn vox_has_avx2() -> c_int {
    vox_audio_mix::has_avx2() as c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    fn scalar_config() -> VoxMixerConfig {
        VoxMixerConfig {
            sample_rate: 8000,
            channels: 1,
            conference_mode: 1,
            kernel: 1,
            frame_pool_size: 0,
        }
    }

    #[test]
    fn test_create_destroy() {
        unsafe {
            let mixer = vox_mixer_create(ptr::null());
            assert!(!mixer.is_null());
            vox_mixer_destroy(mixer);

            let bad = VoxMixerConfig {
                sample_rate: 11025,
                ..scalar_config()
            };
            assert!(vox_mixer_create(&bad).is_null());

            let unknown = VoxMixerConfig {
                kernel: 9,
                ..scalar_config()
            };
            assert!(vox_mixer_create(&unknown).is_null());

            vox_mixer_destroy(ptr::null_mut());
        }
    }

    #[test]
    fn test_conference_round_trip() {
        unsafe {
            let mixer = vox_mixer_create(&scalar_config());
            assert_eq!(vox_mixer_prepare(mixer, 10), 0);

            for pin in 0..2 {
                assert_eq!(vox_mixer_connect_input(mixer, pin), 0);
                assert_eq!(vox_mixer_connect_output(mixer, pin), 0);
            }

            let a = vec![100i16; 80];
            let b = vec![-30i16; 80];
            assert_eq!(vox_mixer_push_input(mixer, 0, a.as_ptr(), a.len()), 0);
            assert_eq!(vox_mixer_push_input(mixer, 1, b.as_ptr(), b.len()), 0);

            assert_eq!(vox_mixer_process(mixer, 0), VOX_TICK_MIXED);
            assert_eq!(vox_mixer_is_bypassing(mixer), 0);

            let mut out = vec![0i16; 80];
            assert_eq!(vox_mixer_pull_output(mixer, 0, out.as_mut_ptr(), out.len()), 80);
            assert!(out.iter().all(|&s| s == -30), "pin 0 hears only pin 1");
            assert_eq!(vox_mixer_pull_output(mixer, 1, out.as_mut_ptr(), out.len()), 80);
            assert!(out.iter().all(|&s| s == 100), "pin 1 hears only pin 0");

            assert_eq!(vox_mixer_pull_output(mixer, 1, out.as_mut_ptr(), out.len()), 0);

            assert_eq!(vox_mixer_unprepare(mixer), 0);
            vox_mixer_destroy(mixer);
        }
    }

    #[test]
    fn test_bypass_and_truncation() {
        unsafe {
            let mixer = vox_mixer_create(&scalar_config());
            vox_mixer_prepare(mixer, 10);
            vox_mixer_connect_input(mixer, 3);
            vox_mixer_connect_output(mixer, 4);

            let talk: Vec<i16> = (0..80).collect();
            vox_mixer_push_input(mixer, 3, talk.as_ptr(), talk.len());
            assert_eq!(vox_mixer_process(mixer, 0), VOX_TICK_BYPASS);
            assert_eq!(vox_mixer_is_bypassing(mixer), 1);

            let mut short = [0i16; 16];
            assert_eq!(vox_mixer_pull_output(mixer, 4, short.as_mut_ptr(), 16), 16);
            assert_eq!(&short[..], &talk[..16]);

            vox_mixer_destroy(mixer);
        }
    }

    #[test]
    fn test_control_status_codes() {
        unsafe {
            let mixer = vox_mixer_create(&scalar_config());

            assert_eq!(vox_mixer_set_sample_rate(mixer, 16000), 0);
            assert_eq!(vox_mixer_set_sample_rate(mixer, 11025), -1);
            assert_eq!(vox_mixer_set_channel_count(mixer, 0), -1);
            assert_eq!(vox_mixer_set_channel_count(mixer, 2), 0);
            assert_eq!(vox_mixer_set_active(mixer, 5, 0), 0);
            assert_eq!(vox_mixer_set_active(mixer, 128, 0), -1);
            assert_eq!(vox_mixer_set_output_enabled(mixer, 127, 1), 0);
            assert_eq!(vox_mixer_set_conference_mode(mixer, 0), 0);
            assert_eq!(vox_mixer_set_input_gain(mixer, 0, 0.5), -1);
            assert_eq!(vox_mixer_set_master_channel(mixer, 0), 0);

            assert_eq!(vox_mixer_push_input(mixer, 0, [0i16].as_ptr(), 1), -1);
            assert_eq!(vox_mixer_connect_input(mixer, 200), -1);
            let mut out = [0i16; 4];
            assert_eq!(vox_mixer_pull_output(mixer, 0, out.as_mut_ptr(), 4), -1);

            assert_eq!(vox_mixer_connect_input(mixer, 0), 0);
            assert_eq!(vox_mixer_disconnect_input(mixer, 0), 0);
            assert_eq!(vox_mixer_push_input(mixer, 0, [0i16].as_ptr(), 1), -1);

            vox_mixer_destroy(mixer);
        }
    }

    #[test]
    fn test_null_handle() {
        unsafe {
            assert_eq!(vox_mixer_prepare(ptr::null(), 10), -1);
            assert_eq!(vox_mixer_process(ptr::null(), 0), VOX_TICK_ERROR);
            assert_eq!(vox_mixer_is_bypassing(ptr::null()), 0);
        }
    }

    #[test]
    fn test_cpu_features() {
        let has_avx2 = vox_has_avx2();
        assert!(has_avx2 == 0 || has_avx2 == 1);
    }

    #[test]
    fn test_version() {
        unsafe {
            let version = vox_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, "0.1.0");
        }
    }
}
