use crate::control::{
    derive_gear_state, map_brake, map_steering, map_throttle, GearState, NormalizedControl,
};
use crate::error::LinkError;

//packet size: 4 * i16
pub const PACKET_SIZE: usize = 8;

//hardware-safe pulse bounds (µs)
pub const STEERING_PULSE_MIN: i16 = 1139;
pub const STEERING_PULSE_MAX: i16 = 1835;
pub const THROTTLE_PULSE_MIN: i16 = 1000;
pub const THROTTLE_PULSE_MAX: i16 = 2000;
pub const BRAKE_PULSE_MIN: i16 = 1135;
pub const BRAKE_PULSE_MAX: i16 = 1948;

//failsafe: centered steering, idle throttle, full brake
pub const NEUTRAL_STEERING_PULSE: i16 = 1500;
pub const NEUTRAL_THROTTLE_PULSE: i16 = 1000;
pub const NEUTRAL_BRAKE_PULSE: i16 = 1948;

/// One actuation command as carried on the wire.
///
/// `gear_state` stays a raw `i16` here because the receiver has to cope with
/// whatever arrives; use [`ActuationFrame::gear`] to interpret it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActuationFrame{
    pub steering_pulse: i16,
    pub throttle_pulse: i16,
    pub brake_pulse: i16,
    pub gear_state: i16,
}

impl ActuationFrame{
    pub fn new(steering_pulse: i16, throttle_pulse: i16, brake_pulse: i16, gear: GearState) -> Self{
        ActuationFrame{
            steering_pulse,
            throttle_pulse,
            brake_pulse,
            gear_state: gear as i16,
        }
    }

    /// Safe-neutral frame sent on shutdown and applied on termination
    pub fn neutral() -> Self{
        Self::new(
            NEUTRAL_STEERING_PULSE,
            NEUTRAL_THROTTLE_PULSE,
            NEUTRAL_BRAKE_PULSE,
            GearState::Neutral,
        )
    }

    /// Map a normalized control triple to pulse widths and gear state
    pub fn from_control(control: &NormalizedControl) -> Self{
        Self::new(
            map_steering(control.angle),
            map_throttle(control.throttle),
            map_brake(control.brake),
            derive_gear_state(control.throttle),
        )
    }

    pub fn gear(&self) -> Option<GearState>{
        GearState::from_i16(self.gear_state)
    }

    /// Clamp the pulse fields to the hardware-safe bounds. The gear state is
    /// left alone.
    pub fn clamped(&self) -> Self{
        ActuationFrame{
            steering_pulse: self.steering_pulse.clamp(STEERING_PULSE_MIN, STEERING_PULSE_MAX),
            throttle_pulse: self.throttle_pulse.clamp(THROTTLE_PULSE_MIN, THROTTLE_PULSE_MAX),
            brake_pulse: self.brake_pulse.clamp(BRAKE_PULSE_MIN, BRAKE_PULSE_MAX),
            gear_state: self.gear_state,
        }
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE]{
        let mut bytes = [0u8; PACKET_SIZE];
        let fields = [self.steering_pulse, self.throttle_pulse, self.brake_pulse, self.gear_state];
        for (chunk, field) in bytes.chunks_exact_mut(2).zip(fields){
            chunk.copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    pub fn decode(data: &[u8]) -> Result<Self, LinkError>{
        let bytes: &[u8; PACKET_SIZE] = data.try_into().map_err(|_|{
            LinkError::MalformedPacket(format!(
                "expected {} bytes, got {}",
                PACKET_SIZE,
                data.len()
            ))
        })?;

        let field = |i: usize| i16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);

        Ok(ActuationFrame{
            steering_pulse: field(0),
            throttle_pulse: field(1),
            brake_pulse: field(2),
            gear_state: field(3),
        })
    }
}

impl Default for ActuationFrame{
    fn default() -> Self{
        Self::neutral()
    }
}
