pub mod actuator;
pub mod config;
pub mod control;
pub mod drive;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod receiver;
pub mod transmitter;
pub mod uart;

#[cfg(feature = "python")]
pub mod python;

pub use actuator::{ActuatorBackend, PinMap, PwmChannel, RelayChannel, SimulatedBackend};
pub use config::Config;
pub use control::{
    ControlMode, DriveMode, GearState, NormalizedControl, PilotControl,
    derive_gear_state, map_brake, map_steering, map_throttle,
};
pub use drive::{DriveInputs, DriveLoop};
pub use error::{ConfigError, LinkError};
pub use receiver::{Receiver, ReceiverOptions, ReceiverState, ReceiverStats, ShutdownToken};
pub use transmitter::Transmitter;
pub use uart::{
    ActuationFrame, FrameDecoder, WireFormat,
    BAUD_RATE, PACKET_SIZE, SYNC_BYTE, open_link,
};
