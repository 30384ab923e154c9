//! TOML configuration shared by both binaries.
//!
//! ```toml
//! [link]
//! device = "/dev/serial0"
//! wire_format = "framed"
//!
//! [drive]
//! mode = "user"
//! ai_throttle_mult = 0.8
//! loop_hz = 20
//!
//! [receiver]
//! failsafe_after = 3
//!
//! [pins]
//! steering = 19
//! ```
//!
//! Every field has a default. The baud rate is fixed by the link and cannot
//! be set here.

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::actuator::PinMap;
use crate::control::ControlMode;
use crate::control::drive_mode::DEFAULT_AI_THROTTLE_MULT;
use crate::error::ConfigError;
use crate::uart::WireFormat;

pub const DEFAULT_TRANSMIT_DEVICE: &str = "/dev/ttyTHS1";
pub const DEFAULT_RECEIVE_DEVICE: &str = "/dev/serial0";
pub const DEFAULT_LOOP_HZ: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    /// Serial device; each binary falls back to its own default
    pub device: Option<String>,
    pub wire_format: WireFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriveConfig {
    /// Mode the drive loop starts in
    pub mode: ControlMode,
    pub ai_throttle_mult: f64,
    pub loop_hz: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::default(),
            ai_throttle_mult: DEFAULT_AI_THROTTLE_MULT,
            loop_hz: DEFAULT_LOOP_HZ,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    pub failsafe_after: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub link: LinkConfig,
    pub drive: DriveConfig,
    pub receiver: ReceiverConfig,
    pub pins: PinMap,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.drive.ai_throttle_mult.is_finite() || self.drive.ai_throttle_mult < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "drive.ai_throttle_mult must be a non-negative number, got {}",
                self.drive.ai_throttle_mult
            )));
        }
        if self.drive.loop_hz == 0 || self.drive.loop_hz > 1000 {
            return Err(ConfigError::Invalid(format!(
                "drive.loop_hz must be in 1..=1000, got {}",
                self.drive.loop_hz
            )));
        }
        if self.receiver.failsafe_after == Some(0) {
            return Err(ConfigError::Invalid("receiver.failsafe_after must be at least 1".to_string()));
        }
        if self.pins.has_duplicates() {
            return Err(ConfigError::Invalid(format!("pins must be distinct: {:?}", self.pins)));
        }
        Ok(())
    }
}
