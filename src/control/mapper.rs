/**
 * Value Mapper
 *
 * Converts normalized control values into servo/ESC pulse widths (µs) and
 * the drivetrain direction code. The actuator side only understands unsigned
 * pulse widths plus a discrete direction selector, so the throttle sign is
 * pulled out into the gear state before its magnitude is mapped.
 */

/// Steering pulse widths in milliseconds
const STEERING_MIN_MS: f64 = 1.139;
const STEERING_CENTER_MS: f64 = 1.5;
const STEERING_MAX_MS: f64 = 1.835;

const THROTTLE_MIN_MS: f64 = 1.0;
const THROTTLE_MAX_MS: f64 = 2.0;

const BRAKE_MIN_MS: f64 = 1.135;
const BRAKE_MAX_MS: f64 = 1.948;

/// Drivetrain direction selector, as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum GearState {
    Drive = 0,
    Neutral = 1,
    Reverse = 2,
}

impl GearState {
    pub fn from_i16(val: i16) -> Option<Self> {
        match val {
            0 => Some(GearState::Drive),
            1 => Some(GearState::Neutral),
            2 => Some(GearState::Reverse),
            _ => None,
        }
    }

    /// Relay levels as `(forward, reverse)`
    pub fn relay_levels(&self) -> (bool, bool) {
        match self {
            GearState::Drive => (true, false),
            GearState::Neutral => (false, false),
            GearState::Reverse => (false, true),
        }
    }
}

// NaN or infinite input never reaches the ms math; it maps like a centered stick
fn sanitize(val: f64) -> f64 {
    if val.is_finite() { val } else { 0.0 }
}

// ms -> µs, truncated like the actuator firmware expects
fn to_pulse(ms: f64) -> i16 {
    (ms * 1000.0) as i16
}

/// Map a steering angle in [-1, 1] to a pulse width.
///
/// Positive angles interpolate center -> max, negative ones min -> center.
/// Zero is the exact center pulse.
pub fn map_steering(angle: f64) -> i16 {
    let angle = sanitize(angle).clamp(-1.0, 1.0);

    let ms = if angle > 0.0 {
        angle * (STEERING_MAX_MS - STEERING_CENTER_MS) + STEERING_CENTER_MS
    } else if angle < 0.0 {
        (1.0 + angle) * (STEERING_CENTER_MS - STEERING_MIN_MS) + STEERING_MIN_MS
    } else {
        STEERING_CENTER_MS
    };

    to_pulse(ms)
}

/// Map a throttle in [-1, 1] to a pulse width. The sign is discarded;
/// see [`derive_gear_state`].
pub fn map_throttle(throttle: f64) -> i16 {
    let throttle = sanitize(throttle).clamp(-1.0, 1.0);
    to_pulse(throttle.abs() * (THROTTLE_MAX_MS - THROTTLE_MIN_MS) + THROTTLE_MIN_MS)
}

/// Map a brake in [0, 1] to a pulse width.
pub fn map_brake(brake: f64) -> i16 {
    let brake = sanitize(brake).clamp(0.0, 1.0);
    to_pulse(brake * (BRAKE_MAX_MS - BRAKE_MIN_MS) + BRAKE_MIN_MS)
}

/// Gear state from the signed, unclamped throttle.
pub fn derive_gear_state(throttle: f64) -> GearState {
    let throttle = sanitize(throttle);
    if throttle > 0.0 {
        GearState::Drive
    } else if throttle < 0.0 {
        GearState::Reverse
    } else {
        GearState::Neutral
    }
}
