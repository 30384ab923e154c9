/**
 * Drive Mode
 *
 * Decides, once per control cycle, whether the human or the autopilot is in
 * charge and produces the single effective control triple.
 */

use serde::{Deserialize, Serialize};

/// Default autopilot throttle multiplier
pub const DEFAULT_AI_THROTTLE_MULT: f64 = 1.0;

/// Normalized control triple
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedControl {
    /// [-1, 1], positive steers right
    pub angle: f64,
    /// [-1, 1], negative drives in reverse
    pub throttle: f64,
    /// [0, 1]
    pub brake: f64,
}

impl NormalizedControl {
    pub fn new(angle: f64, throttle: f64, brake: f64) -> Self {
        Self { angle, throttle, brake }
    }
}

/// Autopilot output. Any field may be missing when no model is loaded or
/// inference has not produced a value yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PilotControl {
    pub angle: Option<f64>,
    pub throttle: Option<f64>,
    pub brake: Option<f64>,
}

impl PilotControl {
    pub fn new(angle: f64, throttle: f64, brake: f64) -> Self {
        Self {
            angle: Some(angle),
            throttle: Some(throttle),
            brake: Some(brake),
        }
    }
}

/// Who drives the car
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Full human control
    #[default]
    User,
    /// Autopilot steers, human handles throttle and brake
    LocalAngle,
    /// Full autopilot with scaled throttle and brake
    LocalPilot,
}

impl ControlMode {
    /// Parse a mode label. Anything that is not `user` or `local_angle`
    /// is treated as full autopilot.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "user" => ControlMode::User,
            "local_angle" => ControlMode::LocalAngle,
            _ => ControlMode::LocalPilot,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ControlMode::User => "user",
            ControlMode::LocalAngle => "local_angle",
            ControlMode::LocalPilot => "local_pilot",
        }
    }

    /// Whether the autopilot has to run this cycle
    pub fn needs_pilot(&self) -> bool {
        *self != ControlMode::User
    }
}

/// Control arbitrator
#[derive(Debug, Clone)]
pub struct DriveMode {
    /// Scale applied to autopilot throttle in full autopilot mode.
    /// The same factor also scales the autopilot brake.
    pub ai_throttle_mult: f64,
}

impl Default for DriveMode {
    fn default() -> Self {
        Self {
            ai_throttle_mult: DEFAULT_AI_THROTTLE_MULT,
        }
    }
}

impl DriveMode {
    pub fn new(ai_throttle_mult: f64) -> Self {
        Self { ai_throttle_mult }
    }

    /// Pick the effective control triple for this cycle
    pub fn arbitrate(
        &self,
        mode: ControlMode,
        user: &NormalizedControl,
        pilot: &PilotControl,
    ) -> NormalizedControl {
        match mode {
            ControlMode::User => *user,
            ControlMode::LocalAngle => NormalizedControl {
                angle: pilot.angle.unwrap_or(0.0),
                throttle: user.throttle,
                brake: user.brake,
            },
            ControlMode::LocalPilot => NormalizedControl {
                angle: pilot.angle.unwrap_or(0.0),
                throttle: pilot.throttle.map_or(0.0, |t| t * self.ai_throttle_mult),
                // brake shares the throttle multiplier; kept as the car has always behaved
                brake: pilot.brake.map_or(0.0, |b| b * self.ai_throttle_mult),
            },
        }
    }
}
