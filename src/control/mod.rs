/**
 * Control Module
 *
 * Brain-side control math:
 * - normalized control triples and drive modes
 * - arbitration between the human and the autopilot
 * - mapping of normalized values to PWM pulse widths and gear states
 *
 * No I/O happens here.
 */

pub mod drive_mode;
pub mod mapper;

pub use drive_mode::{ControlMode, DriveMode, NormalizedControl, PilotControl};
pub use mapper::{derive_gear_state, map_brake, map_steering, map_throttle, GearState};
