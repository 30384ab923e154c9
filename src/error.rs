use std::path::PathBuf;

/// Errors raised on either end of the serial link.
///
/// Only `LinkUnavailable` is fatal. The receiver logs and drops a frame for
/// `ShortRead`, `MalformedPacket` and `UnknownGearState`; the transmitter hands
/// `Io` back to its caller untouched.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("serial link {path} unavailable: {source}")]
    LinkUnavailable {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("short read: got {got} of {expected} bytes")]
    ShortRead { got: usize, expected: usize },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown gear state {0}")]
    UnknownGearState(i16),

    #[error("serial I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("actuator backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
