use crate::memory_map::Address;

/// Failures of the physical serial device itself. These abort the session.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("Unable to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial device {path} is locked by another program: {source}")]
    Lock {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short read from serial device: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

/// The device answered, but not in a way the protocol allows.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Connection timeout (did not set DSR)")]
    DsrNotSet,

    #[error("Connection timeout (did not clear DSR)")]
    DsrNotCleared,

    #[error("Unsupported amount of external sensors: {0}")]
    UnsupportedSensorCount(u8),

    #[error("Safe read of {length} bytes at {address} failed after {attempts} attempts")]
    ReadFailed {
        address: Address,
        length: usize,
        attempts: usize,
    },

    #[error("Invalid address range: {length} bytes at 0x{address:04X}")]
    AddressOutOfRange { address: u32, length: usize },

    #[error("Invalid sensor index {0}")]
    InvalidSensor(usize),

    #[error(
        "Invalid timestamp {year:04}-{month:02}-{day:02} {hour:02}:{minute:02} in device memory"
    )]
    InvalidTimestamp {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },

    #[error("Device did not acknowledge the history reset")]
    ResetNotAcknowledged,

    #[error("Unexpected data length: expected {expected} bytes, got {actual}")]
    UnexpectedLength { expected: usize, actual: usize },
}

/// Top-level error returned by every station operation.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl WeatherError {
    /// The protocol failure behind this error, if it is one.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Hardware(_) => None,
        }
    }
}
