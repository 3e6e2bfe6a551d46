//! Host simulation board.
//!
//! Every capability is backed by in-memory state so the full bridge runs
//! under `cargo test` with no hardware.  Tests drive the transport through
//! a [`SimLink`] handle: they script connects, inbound bytes, and
//! disconnects, cap per-connection write budgets to model slow clients,
//! and read back what the bridge sent.

use core::cell::RefCell;
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use log::info;

use super::{
    Board, BoardParts, CHUNK_SIZE, CapabilitySet, Chunk, ConnHandle, DigitalIo, LogicalPin,
    PartsOf, Timer, TimerCallback, TimerId, Transport, TransportEvent,
};
use crate::adapters::nvs::NvsStore;
use crate::config::BridgeConfig;
use crate::drivers::axes::KinematicAxes;
use crate::error::{BridgeError, Capability, TransportError};

// ───────────────────────────────────────────────────────────────
// Pins
// ───────────────────────────────────────────────────────────────

/// Pin levels plus a log of every write.
#[derive(Debug, Default)]
pub struct SimPins {
    levels: [bool; LogicalPin::COUNT],
    pub writes: Vec<(LogicalPin, bool)>,
}

impl SimPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force an input level (e.g. assert the limit switch).
    pub fn set_input(&mut self, pin: LogicalPin, high: bool) {
        self.levels[pin.index()] = high;
    }

    pub fn level(&self, pin: LogicalPin) -> bool {
        self.levels[pin.index()]
    }
}

impl DigitalIo for SimPins {
    fn read_pin(&mut self, pin: LogicalPin) -> bool {
        self.levels[pin.index()]
    }

    fn write_pin(&mut self, pin: LogicalPin, high: bool) {
        self.levels[pin.index()] = high;
        self.writes.push((pin, high));
    }
}

// ───────────────────────────────────────────────────────────────
// Timer
// ───────────────────────────────────────────────────────────────

/// Timers never fire on their own; call [`SimTimer::fire_all`].
#[derive(Default)]
pub struct SimTimer {
    timers: Vec<Option<(Duration, TimerCallback)>>,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every active callback once.
    pub fn fire_all(&mut self) {
        for (_, cb) in self.timers.iter_mut().flatten() {
            cb();
        }
    }

    pub fn interval(&self, id: TimerId) -> Option<Duration> {
        self.timers
            .get(id as usize)
            .and_then(|t| t.as_ref().map(|(d, _)| *d))
    }

    pub fn active(&self) -> usize {
        self.timers.iter().flatten().count()
    }
}

impl Timer for SimTimer {
    fn start_periodic_timer(
        &mut self,
        interval: Duration,
        callback: TimerCallback,
    ) -> Result<TimerId, BridgeError> {
        if interval.is_zero() {
            return Err(BridgeError::Platform("zero timer interval"));
        }
        let id = TimerId::try_from(self.timers.len())
            .map_err(|_| BridgeError::Platform("timer table full"))?;
        self.timers.push(Some((interval, callback)));
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(slot) = self.timers.get_mut(id as usize) {
            *slot = None;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Transport
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimWire {
    inbound: VecDeque<TransportEvent>,
    /// Open connections and the bytes each will still accept (`None` = unlimited).
    open: BTreeMap<ConnHandle, Option<usize>>,
    /// Everything written per connection, kept after close.
    sent: BTreeMap<ConnHandle, Vec<u8>>,
    closed_by_bridge: Vec<ConnHandle>,
}

/// Bridge-side half of the simulated network.
pub struct SimTransport {
    wire: Rc<RefCell<SimWire>>,
}

/// Test-side half of the simulated network.
#[derive(Clone)]
pub struct SimLink {
    wire: Rc<RefCell<SimWire>>,
}

impl SimTransport {
    pub fn pair() -> (Self, SimLink) {
        let wire = Rc::new(RefCell::new(SimWire::default()));
        (Self { wire: wire.clone() }, SimLink { wire })
    }
}

impl Transport for SimTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        self.wire.borrow_mut().inbound.pop_front()
    }

    fn send(&mut self, conn: ConnHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        let mut wire = self.wire.borrow_mut();
        let budget = wire.open.get_mut(&conn).ok_or(TransportError::NotConnected)?;
        let n = match budget {
            Some(left) => {
                let n = bytes.len().min(*left);
                *left -= n;
                n
            }
            None => bytes.len(),
        };
        wire.sent.entry(conn).or_default().extend_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn close(&mut self, conn: ConnHandle) {
        let mut wire = self.wire.borrow_mut();
        if wire.open.remove(&conn).is_some() {
            wire.closed_by_bridge.push(conn);
        }
    }
}

impl SimLink {
    /// A client connects.
    pub fn connect(&self, conn: ConnHandle) {
        let mut wire = self.wire.borrow_mut();
        wire.open.insert(conn, None);
        wire.sent.remove(&conn);
        wire.inbound.push_back(TransportEvent::Connected(conn));
    }

    /// The client sends `bytes`, split into transport-sized chunks.
    pub fn send(&self, conn: ConnHandle, bytes: &[u8]) {
        let mut wire = self.wire.borrow_mut();
        for piece in bytes.chunks(CHUNK_SIZE) {
            let mut chunk = Chunk::new();
            // `piece` is at most CHUNK_SIZE long
            let _ = chunk.extend_from_slice(piece);
            wire.inbound.push_back(TransportEvent::Received(conn, chunk));
        }
    }

    /// The client hangs up.
    pub fn disconnect(&self, conn: ConnHandle) {
        let mut wire = self.wire.borrow_mut();
        wire.open.remove(&conn);
        wire.inbound.push_back(TransportEvent::Disconnected(conn));
    }

    /// Drain everything the bridge wrote to `conn`, open or not.
    pub fn take_output(&self, conn: ConnHandle) -> Vec<u8> {
        self.wire
            .borrow_mut()
            .sent
            .get_mut(&conn)
            .map(core::mem::take)
            .unwrap_or_default()
    }

    /// [`take_output`](Self::take_output) as lossy UTF-8.
    pub fn take_text(&self, conn: ConnHandle) -> String {
        String::from_utf8_lossy(&self.take_output(conn)).into_owned()
    }

    /// Limit how many more bytes `conn` accepts.  `None` lifts the limit.
    pub fn set_budget(&self, conn: ConnHandle, budget: Option<usize>) {
        if let Some(b) = self.wire.borrow_mut().open.get_mut(&conn) {
            *b = budget;
        }
    }

    pub fn is_open(&self, conn: ConnHandle) -> bool {
        self.wire.borrow().open.contains_key(&conn)
    }

    /// Whether the bridge closed `conn` (as opposed to the client).
    pub fn was_closed_by_bridge(&self, conn: ConnHandle) -> bool {
        self.wire.borrow().closed_by_bridge.contains(&conn)
    }
}

// ───────────────────────────────────────────────────────────────
// Board
// ───────────────────────────────────────────────────────────────

pub struct SimBoard {
    caps: CapabilitySet,
    transport: SimTransport,
    link: SimLink,
    slew_rate: u32,
}

impl SimBoard {
    pub fn new() -> Self {
        let (transport, link) = SimTransport::pair();
        Self {
            caps: CapabilitySet::all(),
            transport,
            link,
            slew_rate: BridgeConfig::default().slew_rate_arcsec_per_sec(),
        }
    }

    /// Model a board variant missing `cap`.
    pub fn without(mut self, cap: Capability) -> Self {
        self.caps = self.caps.without(cap);
        self
    }

    /// Handle for scripting the simulated network.
    pub fn link(&self) -> SimLink {
        self.link.clone()
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Board for SimBoard {
    type Io = SimPins;
    type Timer = SimTimer;
    type Store = NvsStore;
    type Transport = SimTransport;
    type Motion = KinematicAxes;

    fn name(&self) -> &'static str {
        "sim"
    }

    fn capabilities(&self) -> CapabilitySet {
        self.caps
    }

    fn into_parts(self) -> PartsOf<Self> {
        info!("SimBoard: in-memory capabilities");
        BoardParts {
            io: SimPins::new(),
            timer: SimTimer::new(),
            store: NvsStore::default(),
            transport: self.transport,
            motion: KinematicAxes::new(self.slew_rate),
        }
    }
}
