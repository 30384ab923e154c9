//! In-memory actuator used by tests and `--simulate` runs.

use tracing::trace;
use crate::error::LinkError;
use super::{ActuatorBackend, PwmChannel, RelayChannel};

/// Every call the backend received, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    Pulse(PwmChannel, u16),
    Digital(RelayChannel, bool),
    Released,
}

/// Tracks output state (pulses, relay levels, released) for verification.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    pulses: [Option<u16>; 3],
    relays: [bool; 2],
    released: bool,
    events: Vec<BackendEvent>,
}

fn pwm_index(channel: PwmChannel) -> usize {
    match channel {
        PwmChannel::Steering => 0,
        PwmChannel::Throttle => 1,
        PwmChannel::Brake => 2,
    }
}

fn relay_index(channel: RelayChannel) -> usize {
    match channel {
        RelayChannel::Forward => 0,
        RelayChannel::Reverse => 1,
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pulse(&self, channel: PwmChannel) -> Option<u16> {
        self.pulses[pwm_index(channel)]
    }

    /// `(steering, throttle, brake)`, `None` for never-set channels
    pub fn pulses(&self) -> (Option<u16>, Option<u16>, Option<u16>) {
        (
            self.pulse(PwmChannel::Steering),
            self.pulse(PwmChannel::Throttle),
            self.pulse(PwmChannel::Brake),
        )
    }

    pub fn relay(&self, channel: RelayChannel) -> bool {
        self.relays[relay_index(channel)]
    }

    /// `(forward, reverse)`
    pub fn relays(&self) -> (bool, bool) {
        (self.relay(RelayChannel::Forward), self.relay(RelayChannel::Reverse))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    fn check_held(&self) -> Result<(), LinkError> {
        if self.released {
            return Err(LinkError::Backend("output used after release".to_string()));
        }
        Ok(())
    }
}

impl ActuatorBackend for SimulatedBackend {
    fn set_pulse_width(&mut self, channel: PwmChannel, pulse_width: u16) -> Result<(), LinkError> {
        self.check_held()?;
        trace!(?channel, pulse_width, "sim pulse");
        self.pulses[pwm_index(channel)] = Some(pulse_width);
        self.events.push(BackendEvent::Pulse(channel, pulse_width));
        Ok(())
    }

    fn set_digital(&mut self, channel: RelayChannel, high: bool) -> Result<(), LinkError> {
        self.check_held()?;
        trace!(?channel, high, "sim relay");
        self.relays[relay_index(channel)] = high;
        self.events.push(BackendEvent::Digital(channel, high));
        Ok(())
    }

    fn release(&mut self) -> Result<(), LinkError> {
        self.check_held()?;
        self.released = true;
        self.events.push(BackendEvent::Released);
        Ok(())
    }
}
