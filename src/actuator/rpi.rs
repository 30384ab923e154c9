//! Raspberry Pi GPIO backend.
//!
//! Servo outputs use 50 Hz software PWM on plain output pins; relays are
//! ordinary push-pull outputs.

use std::time::Duration;
use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, info};
use crate::error::LinkError;
use super::{ActuatorBackend, PinMap, PwmChannel, RelayChannel};

/// Servo frame period (50 Hz)
const SERVO_PERIOD: Duration = Duration::from_millis(20);

struct Pins {
    steering: OutputPin,
    throttle: OutputPin,
    brake: OutputPin,
    forward: OutputPin,
    reverse: OutputPin,
}

pub struct RppalBackend {
    pins: Option<Pins>,
}

fn gpio_err(e: rppal::gpio::Error) -> LinkError {
    LinkError::Backend(e.to_string())
}

impl RppalBackend {
    /// Claim the five pins as outputs, all low.
    pub fn new(map: &PinMap) -> Result<Self, LinkError> {
        if map.has_duplicates() {
            return Err(LinkError::Backend(format!("duplicate pin in {:?}", map)));
        }

        let gpio = Gpio::new().map_err(gpio_err)?;
        let output = |pin: u8| -> Result<OutputPin, LinkError> {
            Ok(gpio.get(pin).map_err(gpio_err)?.into_output_low())
        };

        let pins = Pins {
            steering: output(map.pwm_pin(PwmChannel::Steering))?,
            throttle: output(map.pwm_pin(PwmChannel::Throttle))?,
            brake: output(map.pwm_pin(PwmChannel::Brake))?,
            forward: output(map.relay_pin(RelayChannel::Forward))?,
            reverse: output(map.relay_pin(RelayChannel::Reverse))?,
        };
        info!(?map, "GPIO outputs claimed");

        Ok(Self { pins: Some(pins) })
    }

    fn pins(&mut self) -> Result<&mut Pins, LinkError> {
        self.pins
            .as_mut()
            .ok_or_else(|| LinkError::Backend("GPIO already released".to_string()))
    }
}

impl ActuatorBackend for RppalBackend {
    fn set_pulse_width(&mut self, channel: PwmChannel, pulse_width: u16) -> Result<(), LinkError> {
        let pins = self.pins()?;
        let pin = match channel {
            PwmChannel::Steering => &mut pins.steering,
            PwmChannel::Throttle => &mut pins.throttle,
            PwmChannel::Brake => &mut pins.brake,
        };
        pin.set_pwm(SERVO_PERIOD, Duration::from_micros(pulse_width as u64))
            .map_err(gpio_err)
    }

    fn set_digital(&mut self, channel: RelayChannel, high: bool) -> Result<(), LinkError> {
        let pins = self.pins()?;
        let pin = match channel {
            RelayChannel::Forward => &mut pins.forward,
            RelayChannel::Reverse => &mut pins.reverse,
        };
        if high {
            pin.set_high();
        } else {
            pin.set_low();
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), LinkError> {
        let mut pins = self
            .pins
            .take()
            .ok_or_else(|| LinkError::Backend("GPIO already released".to_string()))?;

        for pin in [&mut pins.steering, &mut pins.throttle, &mut pins.brake] {
            pin.clear_pwm().map_err(gpio_err)?;
        }
        // dropping the pins resets them to their previous mode
        drop(pins);
        debug!("GPIO outputs released");
        Ok(())
    }
}
