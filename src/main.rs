//! SmartWebServer firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  Core 0: lx200-io thread                                       │
//! │    TcpServer ──▶ IoPump ──▶ IO_CHANNELS                        │
//! │  ─────────────────────────────┬──────────────────────────────  │
//! │  Core 1: main task            ▼                                │
//! │    ChannelTransport ──▶ Bridge (Sessions · Arbiter · Mount)    │
//! │    esp_timer ──▶ control tick flag                             │
//! │    PinBank · NvsStore · KinematicAxes · LogEventSink · TWDT    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result};
use log::{error, info, warn};

use smartwebserver::adapters::channels::IO_CHANNELS;
use smartwebserver::adapters::io_task;
use smartwebserver::adapters::log_sink::LogEventSink;
use smartwebserver::adapters::nvs::NvsStore;
use smartwebserver::adapters::tcp_server::TcpServer;
use smartwebserver::adapters::time::MonotonicClock;
use smartwebserver::app::service::Bridge;
use smartwebserver::config::load_config;
use smartwebserver::drivers::watchdog::Watchdog;
use smartwebserver::hal::{self, SelectedBoard, Timer};

/// Task watchdog timeout for the scheduling loop.
const TWDT_TIMEOUT_MS: u32 = 10_000;

/// Sleep between scheduling cycles when no control tick is due.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SmartWebServer v{}                 ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let store = NvsStore::new().unwrap_or_else(|e| {
        warn!("NVS init failed ({}), running with defaults and no persistence", e);
        NvsStore::default()
    });
    let config = load_config(&store);

    // ── 3. Board capabilities ─────────────────────────────────
    // A missing capability is fatal: returning from main restarts the chip.
    let board = SelectedBoard::new(store, config.slew_rate_arcsec_per_sec())
        .inspect_err(|e| error!("board init failed: {}", e))?;
    let mut parts = hal::init(board)?;

    // ── 4. Socket I/O task ────────────────────────────────────
    let server = TcpServer::bind(config.tcp_port).context("LX200 listener")?;
    let _io = io_task::spawn(server, &IO_CHANNELS).context("I/O task")?;

    // ── 5. Bridge ─────────────────────────────────────────────
    let mut sink = LogEventSink::new();
    let mut bridge = Bridge::new(config.clone(), parts.transport)?;
    bridge.start(&mut parts.motion, &parts.store, &mut sink);

    // ── 6. Control tick timer ─────────────────────────────────
    let ticks_due = Arc::new(AtomicU32::new(0));
    let flag = ticks_due.clone();
    parts.timer.start_periodic_timer(
        Duration::from_millis(u64::from(config.control_tick_ms)),
        Box::new(move || {
            flag.fetch_add(1, Ordering::Release);
        }),
    )?;

    let watchdog = Watchdog::new(TWDT_TIMEOUT_MS);
    let clock = MonotonicClock::new();

    info!("System ready. Listening on port {}.", config.tcp_port);

    // ── 7. Scheduling loop ────────────────────────────────────
    loop {
        let now = clock.now_ms();
        bridge.poll_transport(now, &mut sink);

        let due = ticks_due.swap(0, Ordering::Acquire);
        if due > 0 {
            if due > 1 {
                warn!("control loop overran by {} ticks", due - 1);
            }
            bridge.control_tick(now, &mut parts.motion, &mut parts.io, &mut sink);
        }

        bridge.dispatch_responses(&mut sink);
        bridge.reap_idle(now, &mut sink);
        bridge.persist_if_needed(&mut parts.store, now);

        watchdog.feed();
        std::thread::sleep(IDLE_SLEEP);
    }
}
