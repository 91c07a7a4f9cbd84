//! Summation strategies
//!
//! A [`MixKernel`] performs the per-tick arithmetic: accumulate inputs into
//! 32-bit lanes, then emit saturated PCM16 either from the plain sum or from
//! the sum minus one participant. The scalar and AVX2 kernels are
//! bit-identical; the AVX2 kernel only accepts a narrower set of rates.

use crate::clamping::*;
use crate::error::{MixerError, Result};
use crate::types::KernelChoice;

/// Base unit every supported sample rate is a multiple of
pub const RATE_BASE: u32 = 8000;

pub trait MixKernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_rate(&self, rate: u32) -> bool;

    /// `sum[i] += input[i]`
    fn accumulate(&self, sum: &mut [i32], input: &[i16]);

    /// `out[i] = saturate(sum[i])`
    fn mix_out(&self, out: &mut [i16], sum: &[i32]);

    /// `out[i] = saturate(sum[i] - own[i])`
    fn mix_out_excluding(&self, out: &mut [i16], sum: &[i32], own: &[i16]);
}

/// Portable kernel, accepts any multiple of 8 kHz
#[derive(Debug)]
pub struct ScalarKernel;

impl MixKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn supports_rate(&self, rate: u32) -> bool {
        rate > 0 && rate % RATE_BASE == 0
    }

    fn accumulate(&self, sum: &mut [i32], input: &[i16]) {
        accumulate_scalar(sum, input);
    }

    fn mix_out(&self, out: &mut [i16], sum: &[i32]) {
        saturate_scalar(out, sum);
    }

    fn mix_out_excluding(&self, out: &mut [i16], sum: &[i32], own: &[i16]) {
        subtract_saturate_scalar(out, sum, own);
    }
}

/// AVX2 kernel, 8 samples per lane group, narrowband and wideband only
///
/// Only reachable through [`select`] after runtime detection.
#[cfg(target_arch = "x86_64")]
#[derive(Debug)]
pub struct Avx2Kernel {
    _detected: (),
}

#[cfg(target_arch = "x86_64")]
impl MixKernel for Avx2Kernel {
    fn name(&self) -> &'static str {
        "avx2"
    }

    fn supports_rate(&self, rate: u32) -> bool {
        rate == 8000 || rate == 16000
    }

    fn accumulate(&self, sum: &mut [i32], input: &[i16]) {
        unsafe { accumulate_avx2(sum, input) }
    }

    fn mix_out(&self, out: &mut [i16], sum: &[i32]) {
        unsafe { saturate_avx2(out, sum) }
    }

    fn mix_out_excluding(&self, out: &mut [i16], sum: &[i32], own: &[i16]) {
        unsafe { subtract_saturate_avx2(out, sum, own) }
    }
}

static SCALAR: ScalarKernel = ScalarKernel;

#[cfg(target_arch = "x86_64")]
static AVX2: Avx2Kernel = Avx2Kernel { _detected: () };

/// Resolve a kernel choice against the running CPU and a sample rate
///
/// `Auto` prefers AVX2 and falls back to the scalar kernel on CPUs
/// without it or for rates the AVX2 kernel does not accept. An explicit
/// choice is returned as-is; the caller still checks the rate.
pub fn select(choice: KernelChoice, rate: u32) -> Result<&'static dyn MixKernel> {
    match choice {
        KernelChoice::Scalar => Ok(&SCALAR),
        KernelChoice::Avx2 => avx2().ok_or(MixerError::KernelUnavailable("avx2")),
        KernelChoice::Auto => Ok(avx2()
            .filter(|kernel| kernel.supports_rate(rate))
            .unwrap_or(&SCALAR)),
    }
}

fn avx2() -> Option<&'static dyn MixKernel> {
    #[cfg(target_arch = "x86_64")]
    {
        if has_avx2() {
            return Some(&AVX2);
        }
    }
    None
}

/// Every kernel usable on this CPU
pub fn available() -> Vec<&'static dyn MixKernel> {
    let mut kernels: Vec<&'static dyn MixKernel> = vec![&SCALAR];
    kernels.extend(avx2());
    kernels
}
