//! VoIP conference audio mixer
//!
//! Real-time mixing core for a media pipeline node: up to 128 mono PCM16
//! inputs in, one mixed frame per enabled output per tick.
//!
//! Key features:
//! - Per-input jitter buffers with drift-correcting flow control
//! - Bypass forwarding while only one participant is talking
//! - Conference mode: every participant hears everyone but themselves
//! - AVX2 summation, bit-identical to the scalar path

mod bypass;
pub mod channel;
pub mod clamping;
mod control;
pub mod error;
pub mod frame_pool;
pub mod kernel;
pub mod mixer;
mod ports;
pub mod types;

pub use channel::{ChannelBuffer, FlowControl};
pub use clamping::{has_avx2, saturate_sample};
pub use error::{MixerError, Result};
pub use frame_pool::PoolStats;
pub use kernel::MixKernel;
pub use mixer::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_mixer_defaults() {
        let mixer = AudioMixer::new(MixerConfig::default()).unwrap();
        assert_eq!(mixer.sample_rate(), 16000);
        assert_eq!(mixer.channel_count(), 1);
        assert!(!mixer.is_conference_mode());
        assert_eq!(mixer.state(), Lifecycle::Uninitialized);
    }
}
