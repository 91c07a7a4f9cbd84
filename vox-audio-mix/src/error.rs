//! Mixer error type

use crate::types::{Lifecycle, MAX_CHANNELS};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixerError {
    #[error("unsupported sample rate {rate} Hz for the {kernel} kernel")]
    UnsupportedRate { rate: u32, kernel: &'static str },

    #[error("invalid pin {0} (must be below {})", MAX_CHANNELS)]
    InvalidPin(usize),

    #[error("invalid channel count {0}")]
    InvalidChannelCount(u32),

    #[error("tick interval of {0} ms gives an empty or oversized tick")]
    InvalidTickInterval(u32),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("`{op}` is not allowed while the mixer is {state:?}")]
    InvalidState { op: &'static str, state: Lifecycle },

    #[error("the {0} mix kernel is not available on this CPU")]
    KernelUnavailable(&'static str),
}

/// Validate a pin index against the fixed channel table
pub(crate) fn check_pin(pin: usize, op: &str) -> Result<()> {
    if pin < MAX_CHANNELS {
        Ok(())
    } else {
        log::warn!("{}: invalid pin number {}", op, pin);
        Err(MixerError::InvalidPin(pin))
    }
}
