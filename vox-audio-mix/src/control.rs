//! Control surface
//!
//! Every setter takes the same lock as [`AudioMixer::process`], so a change
//! lands either before or after a tick, never halfway through one. Rate and
//! channel-count changes only reach the tick at the next `prepare`.

use crate::error::{check_pin, MixerError, Result};
use crate::kernel;
use crate::mixer::AudioMixer;

impl AudioMixer {
    /// Set the sample rate used at the next `prepare`
    ///
    /// The rate must be accepted by the configured kernel; on failure the
    /// previous rate is kept. With [`KernelChoice::Auto`] the kernel is
    /// re-resolved for the new rate.
    ///
    /// [`KernelChoice::Auto`]: crate::types::KernelChoice::Auto
    pub fn set_sample_rate(&self, rate: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let kernel = kernel::select(inner.config.kernel, rate)?;

        if !kernel.supports_rate(rate) {
            log::warn!(
                "set_sample_rate: unsupported sampling rate {} for {} kernel",
                rate,
                kernel.name()
            );
            return Err(MixerError::UnsupportedRate {
                rate,
                kernel: kernel.name(),
            });
        }

        if kernel.name() != inner.kernel.name() {
            log::debug!(
                "set_sample_rate: {} Hz switches the mix kernel from {} to {}",
                rate,
                inner.kernel.name(),
                kernel.name()
            );
        }
        inner.kernel = kernel;
        inner.config.sample_rate = rate;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().config.sample_rate
    }

    /// Set the interleaved channel count used at the next `prepare`
    ///
    /// Only scales samples-per-tick; the pin table keeps its capacity.
    pub fn set_channel_count(&self, channels: u32) -> Result<()> {
        if channels == 0 {
            log::warn!("set_channel_count: invalid channel count 0");
            return Err(MixerError::InvalidChannelCount(channels));
        }

        self.inner.lock().config.channels = channels;
        Ok(())
    }

    pub fn channel_count(&self) -> u32 {
        self.inner.lock().config.channels
    }

    /// Mute (`false`) or unmute a pin's contribution to the mix
    pub fn set_active(&self, pin: usize, active: bool) -> Result<()> {
        check_pin(pin, "set_active")?;
        self.inner.lock().channels[pin].active = active;
        Ok(())
    }

    pub fn is_active(&self, pin: usize) -> Result<bool> {
        check_pin(pin, "is_active")?;
        Ok(self.inner.lock().channels[pin].active)
    }

    pub fn set_output_enabled(&self, pin: usize, enabled: bool) -> Result<()> {
        check_pin(pin, "set_output_enabled")?;
        let mut inner = self.inner.lock();
        inner.channels[pin].output_enabled = enabled;
        inner.refresh_single_output();
        Ok(())
    }

    pub fn is_output_enabled(&self, pin: usize) -> Result<bool> {
        check_pin(pin, "is_output_enabled")?;
        Ok(self.inner.lock().channels[pin].output_enabled)
    }

    /// In conference mode each participant hears everyone but themselves
    pub fn set_conference_mode(&self, enabled: bool) {
        self.inner.lock().config.conference_mode = enabled;
    }

    pub fn is_conference_mode(&self) -> bool {
        self.inner.lock().config.conference_mode
    }

    /// Per-input gain is not supported
    pub fn set_input_gain(&self, pin: usize, gain: f32) -> Result<()> {
        log::warn!("set_input_gain: not implemented (pin {}, gain {})", pin, gain);
        Err(MixerError::NotImplemented("input gain"))
    }

    /// Accepted for compatibility; the mixer has no master channel
    pub fn set_master_channel(&self, pin: usize) -> Result<()> {
        check_pin(pin, "set_master_channel")?;
        log::debug!("set_master_channel: pin {} ignored", pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::*;
    use crate::{AudioMixer, MixerError};

    fn mixer(kernel: KernelChoice) -> AudioMixer {
        AudioMixer::new(MixerConfig {
            kernel,
            ..MixerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_set_rate_validation() {
        for kernel in [KernelChoice::Scalar, KernelChoice::Auto] {
            let mixer = mixer(kernel);
            assert_eq!(mixer.sample_rate(), 16000);

            assert!(matches!(
                mixer.set_sample_rate(11025),
                Err(MixerError::UnsupportedRate { rate: 11025, .. })
            ));
            assert_eq!(mixer.sample_rate(), 16000);

            mixer.set_sample_rate(8000).unwrap();
            mixer.set_sample_rate(16000).unwrap();
            assert_eq!(mixer.sample_rate(), 16000);
        }
    }

    #[test]
    fn test_rate_subset_follows_kernel() {
        let scalar = mixer(KernelChoice::Scalar);
        scalar.set_sample_rate(48000).unwrap();
        assert_eq!(scalar.sample_rate(), 48000);

        if let Ok(avx2) = AudioMixer::new(MixerConfig {
            kernel: KernelChoice::Avx2,
            ..MixerConfig::default()
        }) {
            assert!(avx2.set_sample_rate(48000).is_err());
            assert_eq!(avx2.sample_rate(), 16000);
        }
    }

    #[test]
    fn test_auto_kernel_follows_rate() {
        let mixer = mixer(KernelChoice::Auto);
        let narrow = mixer.kernel_name();

        mixer.set_sample_rate(48000).unwrap();
        assert_eq!(mixer.sample_rate(), 48000);
        assert_eq!(mixer.kernel_name(), "scalar");

        mixer.set_sample_rate(16000).unwrap();
        assert_eq!(mixer.kernel_name(), narrow);

        let wideband = AudioMixer::new(MixerConfig {
            sample_rate: 32000,
            ..MixerConfig::default()
        })
        .unwrap();
        assert_eq!(wideband.kernel_name(), "scalar");
    }

    #[test]
    fn test_channel_count() {
        let mixer = mixer(KernelChoice::Scalar);
        assert_eq!(mixer.channel_count(), 1);
        mixer.set_channel_count(2).unwrap();
        assert_eq!(mixer.channel_count(), 2);
        assert_eq!(
            mixer.set_channel_count(0),
            Err(MixerError::InvalidChannelCount(0))
        );
        assert_eq!(mixer.channel_count(), 2);
    }

    #[test]
    fn test_pin_validation() {
        let mixer = mixer(KernelChoice::Scalar);

        assert_eq!(
            mixer.set_active(MAX_CHANNELS, false),
            Err(MixerError::InvalidPin(MAX_CHANNELS))
        );
        assert_eq!(
            mixer.set_output_enabled(200, false),
            Err(MixerError::InvalidPin(200))
        );
        assert!(mixer.set_master_channel(MAX_CHANNELS).is_err());
        assert!(mixer.connect_input(MAX_CHANNELS).is_err());
        assert!(mixer.connect_output(MAX_CHANNELS).is_err());

        // No state changed on the valid pins
        for pin in 0..MAX_CHANNELS {
            assert_eq!(mixer.is_active(pin), Ok(true));
            assert_eq!(mixer.is_output_enabled(pin), Ok(true));
        }
    }

    #[test]
    fn test_flags() {
        let mixer = mixer(KernelChoice::Scalar);
        assert!(!mixer.is_conference_mode());
        mixer.set_conference_mode(true);
        assert!(mixer.is_conference_mode());

        mixer.set_active(5, false).unwrap();
        assert_eq!(mixer.is_active(5), Ok(false));
        mixer.set_output_enabled(6, false).unwrap();
        assert_eq!(mixer.is_output_enabled(6), Ok(false));
    }

    #[test]
    fn test_single_output_tracking() {
        let mixer = mixer(KernelChoice::Scalar);
        let _a = mixer.connect_output(0).unwrap();
        let _b = mixer.connect_output(1).unwrap();
        assert!(!mixer.inner.lock().single_output);

        mixer.set_output_enabled(1, false).unwrap();
        assert!(mixer.inner.lock().single_output);

        mixer.disconnect_output(0).unwrap();
        assert!(!mixer.inner.lock().single_output);
    }

    #[test]
    fn test_input_gain_not_implemented() {
        let mixer = mixer(KernelChoice::Scalar);
        assert_eq!(
            mixer.set_input_gain(0, 0.5),
            Err(MixerError::NotImplemented("input gain"))
        );
        assert_eq!(mixer.is_active(0), Ok(true));
    }
}
