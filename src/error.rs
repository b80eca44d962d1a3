//! Error types for tmc-driver.
//!
//! Provides unified error handling across the register bus, register access,
//! motion execution and configuration.

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all tmc-driver operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration, validation or wiring error
    Config(ConfigError),
    /// Register bus communication error
    Com(ComError),
    /// The driver chip flagged itself unsafe
    Driver(DriverFault),
    /// Motion execution error
    Motion(MotionError),
}

/// Configuration-related errors.
///
/// These are reported synchronously and leave no partial side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// File I/O error
    IoError(heapless::String<128>),
    /// Invalid microstep value (must be power of 2: 1, 2, 4, 8, 16, 32, 64, 128, 256)
    InvalidMicrosteps(u16),
    /// Driver node address out of range (0-3)
    InvalidDriverAddress(u8),
    /// Invalid max speed (must be > 0)
    InvalidMaxSpeed(f64),
    /// Invalid acceleration (must be > 0)
    InvalidAcceleration(f64),
    /// StallGuard averaging window does not fit the sample history
    InvalidStallWindow {
        /// Requested averaging window
        window: usize,
        /// Samples required before the first comparison
        min_samples: u32,
    },
    /// Register name not present in the chip's register table
    UnknownRegister(heapless::String<32>),
    /// Field name not present in the register
    UnknownField {
        /// Register name
        register: heapless::String<32>,
        /// Requested field name
        field: heapless::String<32>,
    },
    /// Attempt to read a write-only register from the bus
    WriteOnly(heapless::String<32>),
    /// Attempt to write a read-only register to the bus
    ReadOnly(heapless::String<32>),
    /// Value does not fit into the field
    FieldOverflow {
        /// Field name
        field: heapless::String<32>,
        /// Rejected value
        value: i32,
        /// Field width in bits
        width: u8,
    },
    /// Motion requested but no STEP/DIR or VACTUAL control is configured
    NoMotionControl,
    /// Operation requires register bus control
    NoRegisterBus,
    /// Feature not available on this chip
    Unsupported(&'static str),
    /// Builder is missing a required part
    MissingPart(&'static str),
}

/// Register bus communication errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ComError {
    /// Reply CRC does not match the computed CRC
    CrcMismatch {
        /// CRC computed over the received bytes
        expected: u8,
        /// CRC byte received
        received: u8,
    },
    /// Fewer bytes received than the frame requires
    ShortResponse {
        /// Expected byte count
        expected: usize,
        /// Received byte count
        received: usize,
    },
    /// Reply has a wrong sync byte, master address or register address
    UnexpectedReply {
        /// Register that was requested
        register: u8,
    },
    /// The local echo differs from the transmitted frame
    EchoMismatch {
        /// Register addressed by the frame
        register: u8,
    },
    /// Register read still invalid after all retries
    ReadFailed {
        /// Register that was requested
        register: u8,
        /// Attempts made
        tries: u32,
    },
    /// IFCNT did not increment after all write attempts
    WriteNotAcknowledged {
        /// Register that was written
        register: u8,
        /// Attempts made
        tries: u32,
    },
    /// Underlying serial or SPI device failed
    Io,
    /// A thread panicked while holding the register bus lock
    BusPoisoned,
}

/// Fatal fault reported by the driver chip itself.
///
/// Once a transport has observed a fault it stays latched: every further
/// transaction fails with this error and no motion is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverFault {
    /// GSTAT value read while handling the fault (0 if it could not be read)
    pub gstat: u32,
}

/// Motion execution errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Pin operation failed
    PinError,
    /// A threaded movement is already running
    AlreadyRunning,
    /// No threaded movement to wait for
    NotRunning,
    /// The motion worker thread panicked
    WorkerPanicked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Com(e) => write!(f, "Communication error: {}", e),
            Error::Driver(e) => write!(f, "Driver fault: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::InvalidMicrosteps(v) => {
                write!(f, "Invalid microsteps: {}. Valid values: 1, 2, 4, 8, 16, 32, 64, 128, 256", v)
            }
            ConfigError::InvalidDriverAddress(v) => {
                write!(f, "Invalid driver address: {}. Must be 0-3", v)
            }
            ConfigError::InvalidMaxSpeed(v) => write!(f, "Invalid max speed: {}. Must be > 0", v),
            ConfigError::InvalidAcceleration(v) => {
                write!(f, "Invalid acceleration: {}. Must be > 0", v)
            }
            ConfigError::InvalidStallWindow { window, min_samples } => write!(
                f,
                "Invalid StallGuard window {} with {} minimum samples",
                window, min_samples
            ),
            ConfigError::UnknownRegister(name) => write!(f, "Unknown register '{}'", name),
            ConfigError::UnknownField { register, field } => {
                write!(f, "Register '{}' has no field '{}'", register, field)
            }
            ConfigError::WriteOnly(name) => write!(f, "Register '{}' is write-only", name),
            ConfigError::ReadOnly(name) => write!(f, "Register '{}' is read-only", name),
            ConfigError::FieldOverflow { field, value, width } => {
                write!(f, "Value {} does not fit {}-bit field '{}'", value, width, field)
            }
            ConfigError::NoMotionControl => write!(f, "No motion control configured"),
            ConfigError::NoRegisterBus => {
                write!(f, "Operation requires register bus control (UART or SPI)")
            }
            ConfigError::Unsupported(what) => write!(f, "Not supported by this chip: {}", what),
            ConfigError::MissingPart(what) => write!(f, "{} is required", what),
        }
    }
}

impl fmt::Display for ComError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComError::CrcMismatch { expected, received } => {
                write!(f, "CRC mismatch: computed {:#04x}, received {:#04x}", expected, received)
            }
            ComError::ShortResponse { expected, received } => {
                write!(f, "Short response: expected {} bytes, received {}", expected, received)
            }
            ComError::UnexpectedReply { register } => {
                write!(f, "Unexpected reply to register {:#04x}", register)
            }
            ComError::EchoMismatch { register } => {
                write!(f, "Echo of the frame for register {:#04x} does not match", register)
            }
            ComError::ReadFailed { register, tries } => {
                write!(f, "Reading register {:#04x} failed after {} tries", register, tries)
            }
            ComError::WriteNotAcknowledged { register, tries } => write!(
                f,
                "Write to register {:#04x} not acknowledged after {} tries",
                register, tries
            ),
            ComError::Io => write!(f, "Bus device I/O failed"),
            ComError::BusPoisoned => write!(f, "Register bus lock poisoned"),
        }
    }
}

impl fmt::Display for DriverFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver chip reported an error (GSTAT {:#05x})", self.gstat)
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::PinError => write!(f, "GPIO pin operation failed"),
            MotionError::AlreadyRunning => write!(f, "A movement is already running"),
            MotionError::NotRunning => write!(f, "No movement is running"),
            MotionError::WorkerPanicked => write!(f, "Motion worker thread panicked"),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<ComError> for Error {
    fn from(e: ComError) -> Self {
        Error::Com(e)
    }
}

impl From<DriverFault> for Error {
    fn from(e: DriverFault) -> Self {
        Error::Driver(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl std::error::Error for Error {}

impl std::error::Error for ConfigError {}

impl std::error::Error for ComError {}

impl std::error::Error for DriverFault {}

impl std::error::Error for MotionError {}

/// Build a bounded name for error payloads, truncating if needed.
pub(crate) fn name<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
