//! Simulation rig for integration tests.
//!
//! Wraps a [`Bridge`] built on the host simulation board and advances a
//! virtual clock one control tick per cycle.  Tests script clients through
//! the [`SimLink`] and read back exactly what went out on the wire.

use smartwebserver::adapters::nvs::NvsStore;
use smartwebserver::app::events::BridgeEvent;
use smartwebserver::app::ports::RecordingSink;
use smartwebserver::app::service::Bridge;
use smartwebserver::config::BridgeConfig;
use smartwebserver::drivers::axes::KinematicAxes;
use smartwebserver::hal::sim::{SimBoard, SimLink, SimPins, SimTimer, SimTransport};
use smartwebserver::hal::{self, ConnHandle};

/// Defaults with rate limiting off so bursts are deterministic.
pub fn quiet() -> BridgeConfig {
    BridgeConfig {
        rate_limit_per_sec: 0,
        ..Default::default()
    }
}

pub struct Rig {
    pub bridge: Bridge<SimTransport>,
    pub link: SimLink,
    pub motion: KinematicAxes,
    pub io: SimPins,
    pub store: NvsStore,
    pub timer: SimTimer,
    pub sink: RecordingSink,
    pub now: u64,
    tick_ms: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(quiet())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self::boot(config, None)
    }

    /// Boot on `store`, as after a power cycle.
    pub fn with_store(config: BridgeConfig, store: NvsStore) -> Self {
        Self::boot(config, Some(store))
    }

    fn boot(config: BridgeConfig, store: Option<NvsStore>) -> Self {
        let board = SimBoard::new();
        let link = board.link();
        let parts = hal::init(board).expect("sim board has every capability");
        let store = store.unwrap_or(parts.store);
        let tick_ms = u64::from(config.control_tick_ms);
        let mut bridge = Bridge::new(config, parts.transport).expect("valid config");
        let mut motion = parts.motion;
        let mut sink = RecordingSink::new();
        bridge.start(&mut motion, &store, &mut sink);
        Self {
            bridge,
            link,
            motion,
            io: parts.io,
            store,
            timer: parts.timer,
            sink,
            now: 0,
            tick_ms,
        }
    }

    /// Power-cycle: keep only the store.
    pub fn reboot(self, config: BridgeConfig) -> Self {
        Self::with_store(config, self.store)
    }

    /// One scheduling cycle plus park persistence.
    pub fn cycle(&mut self) {
        self.now += self.tick_ms;
        self.bridge
            .run_cycle(self.now, &mut self.motion, &mut self.io, &mut self.sink);
        self.bridge.persist_if_needed(&mut self.store, self.now);
    }

    pub fn cycles(&mut self, n: usize) {
        for _ in 0..n {
            self.cycle();
        }
    }

    /// Connect `conn` and let the bridge open its session.
    pub fn connect(&mut self, conn: ConnHandle) {
        self.link.connect(conn);
        self.cycle();
    }

    /// Send `bytes` from `conn`, run one cycle, return what came back.
    pub fn exchange(&mut self, conn: ConnHandle, bytes: &[u8]) -> String {
        self.link.send(conn, bytes);
        self.cycle();
        self.link.take_text(conn)
    }

    pub fn events(&self, pred: impl Fn(&BridgeEvent) -> bool) -> usize {
        self.sink.count(pred)
    }
}
