//! Activity tracking deciding between bypass forwarding and full summation
//!
//! With a single contributing input there is nothing to synchronise and
//! nothing to sum: its frames can be forwarded to the outputs untouched.
//! An input whose queue is empty keeps counting as active for
//! [`BYPASS_MODE_TIMEOUT`] time units after its last frame, so short gaps
//! between talk spurts do not flap the mixer in and out of bypass.

use crate::channel::Channel;
use crate::ports::InputPorts;
use crate::types::{BYPASS_MODE_TIMEOUT, MAX_CHANNELS};

/// Outcome of one activity scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activity {
    Idle,
    Single { pin: usize },
    Multiple { count: usize },
}

#[derive(Debug, Default)]
pub(crate) struct BypassDetector {
    bypassing: bool,
}

impl BypassDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bypassing(&self) -> bool {
        self.bypassing
    }

    /// Count active inputs at `now`, stamping `last_activity` on busy ones
    pub fn scan(&self, inputs: &InputPorts, channels: &mut [Channel], now: u64) -> Activity {
        let mut count = 0;
        let mut last_pin = None;

        for (pin, chan) in channels.iter_mut().enumerate().take(MAX_CHANNELS) {
            let Some(queue) = inputs.get(pin) else {
                continue;
            };

            let active = if !queue.is_empty() {
                chan.last_activity = Some(now);
                true
            } else {
                match chan.last_activity {
                    Some(seen) => now.saturating_sub(seen) < BYPASS_MODE_TIMEOUT,
                    None => {
                        chan.last_activity = Some(now);
                        false
                    }
                }
            };

            if active {
                count += 1;
                last_pin = Some(pin);
            }
        }

        match (count, last_pin) {
            (1, Some(pin)) => Activity::Single { pin },
            (0, _) | (_, None) => Activity::Idle,
            (count, _) => Activity::Multiple { count },
        }
    }

    /// Record the decision for this tick, logging only transitions
    pub fn update(&mut self, activity: Activity) {
        match activity {
            Activity::Single { .. } if !self.bypassing => {
                self.bypassing = true;
                log::info!("audio mixer is entering bypass mode");
            }
            Activity::Multiple { .. } if self.bypassing => {
                self.bypassing = false;
                log::info!("audio mixer is leaving bypass mode");
            }
            _ => {}
        }
    }
}
