//! Unified error and status types for the command bridge.
//!
//! Two families live here:
//!
//! - [`Status`] is what a client sees on the wire.  Every non-fatal failure
//!   becomes a `Status` inside a session-scoped response; it never aborts
//!   the control loop.
//! - [`BridgeError`] is what fallible Rust operations return (boot,
//!   configuration, storage, transport).  Only
//!   [`BridgeError::CapabilityUnavailable`] is fatal, and it surfaces
//!   before any session exists.
//!
//! All variants are `Copy` so they can be passed through the arbiter and
//! control loop without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Wire status
// ---------------------------------------------------------------------------

/// Outcome carried by every response event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Read-only or stop command answered.
    Ok,
    /// Mutating command moved into the command slot.
    Accepted,
    /// Mutating command is driving the hardware.
    Executing,
    /// Mutating command finished successfully.
    Completed,
    /// Unknown opcode or unparseable operand.
    MalformedCommand,
    /// Frame exceeded `max_frame_len` before its terminator.
    FrameTooLong,
    /// Queue full, slot contended, or rate limit hit.  Client should retry.
    Busy,
    /// Physical bounds or motion state forbid the command.
    MechanicalConflict,
    /// Command watchdog expired.
    TimedOut,
    /// A newer command of the same group replaced this one in the queue.
    Superseded,
    /// A stop command cancelled this one.
    Aborted,
}

impl Status {
    /// True for the statuses that end a request's lifecycle.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Accepted | Self::Executing)
    }

    /// True for statuses encoded as `E:<name>#` on the wire.
    pub const fn is_error(self) -> bool {
        !matches!(
            self,
            Self::Ok | Self::Accepted | Self::Executing | Self::Completed
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Accepted => "Accepted",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::MalformedCommand => "MalformedCommand",
            Self::FrameTooLong => "FrameTooLong",
            Self::Busy => "Busy",
            Self::MechanicalConflict => "MechanicalConflict",
            Self::TimedOut => "TimedOut",
            Self::Superseded => "Superseded",
            Self::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// HAL capabilities
// ---------------------------------------------------------------------------

/// One capability a board variant may or may not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Capability {
    DigitalIo = 0b0000_0001,
    Timer = 0b0000_0010,
    NonVolatileStore = 0b0000_0100,
    Transport = 0b0000_1000,
    Motion = 0b0001_0000,
}

impl Capability {
    pub const ALL: [Self; 5] = [
        Self::DigitalIo,
        Self::Timer,
        Self::NonVolatileStore,
        Self::Transport,
        Self::Motion,
    ];

    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigitalIo => write!(f, "digital I/O"),
            Self::Timer => write!(f, "periodic timer"),
            Self::NonVolatileStore => write!(f, "non-volatile store"),
            Self::Transport => write!(f, "network transport"),
            Self::Motion => write!(f, "motion primitive"),
        }
    }
}

// ---------------------------------------------------------------------------
// Limit faults
// ---------------------------------------------------------------------------

/// Latched mechanical faults, accumulated in a bitmask by the limit
/// supervisor so several can be active at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LimitFault {
    /// Declination axis left its configured range.
    Axis2Range = 0b0000_0001,
    /// Hardware limit switch input is asserted.
    LimitSwitch = 0b0000_0010,
    /// Motor driver reported a fault.
    DriverFault = 0b0000_0100,
}

impl LimitFault {
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LimitFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axis2Range => write!(f, "axis 2 outside limits"),
            Self::LimitSwitch => write!(f, "limit switch asserted"),
            Self::DriverFault => write!(f, "motor driver fault"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subsystem errors
// ---------------------------------------------------------------------------

/// Configuration failed validation or could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.  The message names the field.
    ValidationFailed(&'static str),
    /// Stored bytes did not decode.
    Corrupted,
    /// Serialisation failed.
    Encode,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Corrupted => write!(f, "stored config corrupted"),
            Self::Encode => write!(f, "config encode failed"),
        }
    }
}

/// Errors from the [`NonVolatileStore`](crate::hal::NonVolatileStore) capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Key longer than the backend allows.
    KeyTooLong,
    /// Value larger than the backend allows.
    ValueTooLarge,
    /// Partition full.
    Full,
    /// Backend I/O failure.
    Io,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyTooLong => write!(f, "key too long"),
            Self::ValueTooLarge => write!(f, "value too large"),
            Self::Full => write!(f, "storage full"),
            Self::Io => write!(f, "storage I/O error"),
        }
    }
}

/// Errors from the [`Transport`](crate::hal::Transport) capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The connection handle is not open.
    NotConnected,
    /// Socket-level failure; the connection should be dropped.
    Io,
    /// Listener could not be created.
    Bind,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "connection not open"),
            Self::Io => write!(f, "socket I/O error"),
            Self::Bind => write!(f, "listener bind failed"),
        }
    }
}

/// Errors from the [`Motion`](crate::hal::Motion) capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionError {
    /// The drive is latched in a fault and refuses new motion.
    Faulted,
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faulted => write!(f, "drive faulted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The selected board lacks a required capability.  Fatal at boot.
    CapabilityUnavailable(Capability),
    Config(ConfigError),
    Store(StoreError),
    Transport(TransportError),
    /// A platform service (timer, thread) failed to start.
    Platform(&'static str),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityUnavailable(cap) => write!(f, "capability unavailable: {cap}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Platform(msg) => write!(f, "platform: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, BridgeError>;
