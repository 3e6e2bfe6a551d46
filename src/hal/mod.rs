//! Hardware abstraction layer — the capability contract every board meets.
//!
//! ```text
//!   Bridge / MountController
//!            │  (generic over capability traits, never over board identity)
//!   ─────────┼─────────────────────────────────────────────────────────
//!            ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ Board                                                        │
//!   │  DigitalIo · Timer · NonVolatileStore · Transport · Motion   │
//!   └──────────────────────────────────────────────────────────────┘
//!        ▲                                   ▲
//!   Esp32Board (target_os = "espidf")   SimBoard (host)
//! ```
//!
//! The board is chosen at build time through [`SelectedBoard`].  A board
//! that cannot supply a capability says so in [`Board::capabilities`], and
//! [`init`] turns that into [`BridgeError::CapabilityUnavailable`] before
//! anything above the HAL runs.  Nothing reports a missing capability at
//! call time.

#[cfg(target_os = "espidf")]
pub mod esp32;
pub mod sim;

use core::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Capability, MotionError, StoreError, TransportError};

// ───────────────────────────────────────────────────────────────
// Digital I/O
// ───────────────────────────────────────────────────────────────

/// Board-independent pin names.  Each board's pinmap resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogicalPin {
    /// Status LED output.
    StatusLed = 0,
    /// Limit switch input, HIGH = limit reached.
    LimitSense = 1,
    /// Axis 1 motor driver enable output.
    Axis1Enable = 2,
    /// Axis 2 motor driver enable output.
    Axis2Enable = 3,
}

impl LogicalPin {
    pub const COUNT: usize = 4;

    pub const ALL: [Self; Self::COUNT] = [
        Self::StatusLed,
        Self::LimitSense,
        Self::Axis1Enable,
        Self::Axis2Enable,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

pub trait DigitalIo {
    /// Current level of `pin`.  Unreadable pins read LOW.
    fn read_pin(&mut self, pin: LogicalPin) -> bool;

    /// Drive `pin` HIGH (`true`) or LOW.
    fn write_pin(&mut self, pin: LogicalPin, high: bool);
}

// ───────────────────────────────────────────────────────────────
// Timer
// ───────────────────────────────────────────────────────────────

pub type TimerId = u8;

/// Runs in the platform timer context.  Keep it short; push work to the
/// main loop through an atomic or channel.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

pub trait Timer {
    fn start_periodic_timer(
        &mut self,
        interval: Duration,
        callback: TimerCallback,
    ) -> Result<TimerId, BridgeError>;

    fn cancel(&mut self, id: TimerId);
}

// ───────────────────────────────────────────────────────────────
// Non-volatile store
// ───────────────────────────────────────────────────────────────

/// Keys are `"namespace/name"`; backends map the namespace onto their
/// own partitioning.
pub trait NonVolatileStore {
    /// Write `bytes` under `key` atomically.
    fn persist(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Read `key`.  `Ok(None)` when it was never written.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

/// Opaque per-connection handle issued by the transport.
pub type ConnHandle = u16;

/// Largest inbound chunk a transport hands up in one event.
pub const CHUNK_SIZE: usize = 128;

pub type Chunk = heapless::Vec<u8, CHUNK_SIZE>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(ConnHandle),
    Received(ConnHandle, Chunk),
    Disconnected(ConnHandle),
}

/// Non-blocking byte-stream transport serving many connections.
pub trait Transport {
    /// Next pending event, or `None` when nothing is waiting.
    fn poll(&mut self) -> Option<TransportEvent>;

    /// Queue `bytes` for `conn`.  Returns how many were accepted; `Ok(0)`
    /// means the connection cannot take more right now.
    fn send(&mut self, conn: ConnHandle, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Drop `conn`.  No `Disconnected` event follows.
    fn close(&mut self, conn: ConnHandle);
}

// ───────────────────────────────────────────────────────────────
// Motion primitive
// ───────────────────────────────────────────────────────────────

/// Arcseconds per full turn of axis 1.
pub const AXIS1_TURN_ARCSEC: i64 = 360 * 3600;

/// Axis positions in arcseconds.  Axis 1 is right ascension
/// (0..1_296_000, 15″ per second of time); axis 2 is declination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AxisPair {
    pub axis1: i64,
    pub axis2: i64,
}

impl AxisPair {
    pub const fn new(axis1: i64, axis2: i64) -> Self {
        Self { axis1, axis2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    Idle,
    /// Goto in progress.
    Slewing,
    /// Open-ended move in progress.
    Moving,
    /// Drive latched a fault.
    Fault,
}

/// The interface the stepping layer sits below.
pub trait Motion {
    /// Start a goto to `target` at the maximum slew rate.
    fn goto(&mut self, target: AxisPair) -> Result<(), MotionError>;

    /// Start an open-ended move in `dir` at `rate_arcsec_per_sec`.
    fn start_move(&mut self, dir: Direction, rate_arcsec_per_sec: u32) -> Result<(), MotionError>;

    /// Halt all motion.  Tracking is unaffected.
    fn stop(&mut self);

    fn set_tracking(&mut self, enabled: bool);

    /// Maximum slew rate used by [`goto`](Self::goto).
    fn set_slew_rate(&mut self, arcsec_per_sec: u32);

    /// Redefine the current position without moving.
    fn set_position(&mut self, position: AxisPair);

    /// Advance the drive by `elapsed_ms` and report its status.
    fn service(&mut self, elapsed_ms: u32) -> MotionStatus;

    fn status(&self) -> MotionStatus;

    fn position(&self) -> AxisPair;
}

// ───────────────────────────────────────────────────────────────
// Board
// ───────────────────────────────────────────────────────────────

/// Bitmask of [`Capability`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < Capability::ALL.len() {
            bits |= Capability::ALL[i].mask();
            i += 1;
        }
        Self(bits)
    }

    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.mask())
    }

    pub const fn without(self, cap: Capability) -> Self {
        Self(self.0 & !cap.mask())
    }

    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.mask() != 0
    }

    /// First capability in `required` this set lacks.
    pub fn first_missing(self, required: Self) -> Option<Capability> {
        Capability::ALL
            .into_iter()
            .find(|&cap| required.contains(cap) && !self.contains(cap))
    }
}

/// Everything the bridge needs to run.
pub const REQUIRED_CAPABILITIES: CapabilitySet = CapabilitySet::all();

/// One concrete implementation per capability, split out of a board.
pub struct BoardParts<I, T, S, X, M> {
    pub io: I,
    pub timer: T,
    pub store: S,
    pub transport: X,
    pub motion: M,
}

pub type PartsOf<B> = BoardParts<
    <B as Board>::Io,
    <B as Board>::Timer,
    <B as Board>::Store,
    <B as Board>::Transport,
    <B as Board>::Motion,
>;

pub trait Board {
    type Io: DigitalIo;
    type Timer: Timer;
    type Store: NonVolatileStore;
    type Transport: Transport;
    type Motion: Motion;

    fn name(&self) -> &'static str;

    fn capabilities(&self) -> CapabilitySet;

    fn into_parts(self) -> PartsOf<Self>
    where
        Self: Sized;
}

/// The board this build targets.
#[cfg(target_os = "espidf")]
pub type SelectedBoard = esp32::Esp32Board;

/// The board this build targets.
#[cfg(not(target_os = "espidf"))]
pub type SelectedBoard = sim::SimBoard;

/// Check `board` against [`REQUIRED_CAPABILITIES`] and split it.
pub fn init<B: Board>(board: B) -> Result<PartsOf<B>, BridgeError> {
    let caps = board.capabilities();
    if let Some(missing) = caps.first_missing(REQUIRED_CAPABILITIES) {
        error!("HAL: board '{}' lacks {}", board.name(), missing);
        return Err(BridgeError::CapabilityUnavailable(missing));
    }
    info!("HAL: board '{}' ready", board.name());
    Ok(board.into_parts())
}
