/**
 * Actuator Module
 *
 * Physical outputs on the actuator computer:
 * - three servo-style PWM channels (steering, throttle, brake)
 * - two direction relays (forward enable, reverse enable)
 *
 * The receiver only talks to the `ActuatorBackend` trait, so the Raspberry Pi
 * GPIO driver and the in-memory simulation are interchangeable.
 */

pub mod simulated;
#[cfg(feature = "rpi")]
pub mod rpi;

pub use simulated::{BackendEvent, SimulatedBackend};
#[cfg(feature = "rpi")]
pub use rpi::RppalBackend;

use serde::{Deserialize, Serialize};
use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PwmChannel {
    Steering,
    Throttle,
    Brake,
}

impl PwmChannel {
    pub const ALL: [PwmChannel; 3] = [PwmChannel::Steering, PwmChannel::Throttle, PwmChannel::Brake];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayChannel {
    Forward,
    Reverse,
}

impl RelayChannel {
    pub const ALL: [RelayChannel; 2] = [RelayChannel::Forward, RelayChannel::Reverse];
}

/// Output capability injected into the receiver.
///
/// Implementations own their hardware exclusively; nothing else may drive
/// the same pins while the receiver runs.
pub trait ActuatorBackend {
    /// Set the pulse width (µs) of a PWM channel
    fn set_pulse_width(&mut self, channel: PwmChannel, pulse_width: u16) -> Result<(), LinkError>;

    /// Drive a relay line high or low
    fn set_digital(&mut self, channel: RelayChannel, high: bool) -> Result<(), LinkError>;

    /// Give the hardware back. No output calls are made afterwards.
    fn release(&mut self) -> Result<(), LinkError>;
}

impl<B: ActuatorBackend + ?Sized> ActuatorBackend for Box<B> {
    fn set_pulse_width(&mut self, channel: PwmChannel, pulse_width: u16) -> Result<(), LinkError> {
        (**self).set_pulse_width(channel, pulse_width)
    }

    fn set_digital(&mut self, channel: RelayChannel, high: bool) -> Result<(), LinkError> {
        (**self).set_digital(channel, high)
    }

    fn release(&mut self) -> Result<(), LinkError> {
        (**self).release()
    }
}

/// Claim the real output pins.
#[cfg(feature = "rpi")]
pub fn hardware_backend(pins: &PinMap) -> Result<Box<dyn ActuatorBackend>, LinkError> {
    Ok(Box::new(RppalBackend::new(pins)?))
}

/// Without GPIO support there is nothing to drive. Refuse instead of
/// silently applying frames to memory.
#[cfg(not(feature = "rpi"))]
pub fn hardware_backend(_pins: &PinMap) -> Result<Box<dyn ActuatorBackend>, LinkError> {
    Err(LinkError::Backend(
        "built without GPIO support: rebuild with `--features rpi` or run with --simulate".to_string(),
    ))
}

/// BCM pin numbers of the five outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    pub steering: u8,
    pub throttle: u8,
    pub brake: u8,
    pub forward: u8,
    pub reverse: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            steering: 19,
            throttle: 12,
            brake: 13,
            forward: 16,
            reverse: 26,
        }
    }
}

impl PinMap {
    pub fn pwm_pin(&self, channel: PwmChannel) -> u8 {
        match channel {
            PwmChannel::Steering => self.steering,
            PwmChannel::Throttle => self.throttle,
            PwmChannel::Brake => self.brake,
        }
    }

    pub fn relay_pin(&self, channel: RelayChannel) -> u8 {
        match channel {
            RelayChannel::Forward => self.forward,
            RelayChannel::Reverse => self.reverse,
        }
    }

    /// Every output needs its own pin
    pub fn has_duplicates(&self) -> bool {
        let pins = [self.steering, self.throttle, self.brake, self.forward, self.reverse];
        pins.iter()
            .enumerate()
            .any(|(i, pin)| pins[i + 1..].contains(pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pins() {
        let pins = PinMap::default();
        assert_eq!(pins.pwm_pin(PwmChannel::Steering), 19);
        assert_eq!(pins.pwm_pin(PwmChannel::Brake), 13);
        assert_eq!(pins.relay_pin(RelayChannel::Reverse), 26);
        assert!(!pins.has_duplicates());
    }

    #[test]
    fn test_duplicate_pins_detected() {
        let pins = PinMap { forward: 12, ..Default::default() };
        assert!(pins.has_duplicates());
    }

    #[cfg(not(feature = "rpi"))]
    #[test]
    fn test_hardware_backend_requires_gpio_support() {
        let err = hardware_backend(&PinMap::default()).err().unwrap();
        assert!(matches!(err, LinkError::Backend(ref msg) if msg.contains("--features rpi")));
    }

    #[test]
    fn test_boxed_backend_forwards_calls() {
        let mut boxed: Box<dyn ActuatorBackend> = Box::new(SimulatedBackend::new());
        boxed.set_pulse_width(PwmChannel::Brake, 1948).unwrap();
        boxed.set_digital(RelayChannel::Forward, true).unwrap();
        boxed.release().unwrap();
        assert!(boxed.set_digital(RelayChannel::Forward, false).is_err());
    }
}
