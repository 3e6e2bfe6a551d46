//! Async transport I/O task — reactor-driven socket pump.
//!
//! Runs in a dedicated thread using `edge-executor` for cooperative
//! multi-task scheduling and `async-io-mini` for reactor-driven timers
//! (no busy-spinning).  Two concurrent futures share one [`IoPump`]:
//!
//! 1. **Read** — polls the socket transport every 1ms via reactor timer,
//!    forwards events to the bridge and retries pending writes
//! 2. **Write** — truly async via `outbound.receive().await`
//!    (wakes instantly when the bridge queues bytes)
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  I/O Thread (protocol core)                              │
//!  │  ┌────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                      │  │
//!  │  │   ┌──────────────┐        ┌──────────────────┐     │  │
//!  │  │   │ Read + flush │        │  Write (async)   │     │  │
//!  │  │   │ 1ms ⏱        │        │  wake-on-send    │     │  │
//!  │  │   └──────┬───────┘        └────────┬─────────┘     │  │
//!  │  │          └────── IoPump ◀──────────┘               │  │
//!  │  └────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Bytes the socket cannot take yet are held per connection.  A client
//! that lets more than [`MAX_PENDING_BYTES`] pile up is disconnected.

use core::cell::RefCell;
use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use embassy_sync::channel::TrySendError;
use log::{info, warn};

use super::channels::{IoChannels, IoCommand};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::BridgeError;
use crate::hal::{ConnHandle, Transport, TransportEvent};

/// Per-connection write backlog before the client is dropped.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Read poll period.
const READ_INTERVAL: Duration = Duration::from_millis(1);

/// Moves bytes between a socket [`Transport`] and the bridge channels.
pub struct IoPump<T: Transport> {
    transport: T,
    channels: &'static IoChannels,
    pending: BTreeMap<ConnHandle, VecDeque<u8>>,
    /// Events that did not fit in the inbound channel yet.
    backlog: VecDeque<TransportEvent>,
}

impl<T: Transport> IoPump<T> {
    pub fn new(transport: T, channels: &'static IoChannels) -> Self {
        Self {
            transport,
            channels,
            pending: BTreeMap::new(),
            backlog: VecDeque::new(),
        }
    }

    /// Forward transport events to the bridge.  Stops when the inbound
    /// channel is full so no chunk is ever dropped.  Returns how many
    /// events were forwarded.
    pub fn pump_inbound(&mut self) -> usize {
        let mut forwarded = 0;
        loop {
            let event = match self.backlog.pop_front() {
                Some(ev) => ev,
                None => match self.transport.poll() {
                    Some(ev) => ev,
                    None => break,
                },
            };
            if let TransportEvent::Disconnected(conn) = event {
                self.pending.remove(&conn);
            }
            match self.channels.inbound.try_send(event) {
                Ok(()) => forwarded += 1,
                Err(TrySendError::Full(event)) => {
                    self.backlog.push_front(event);
                    break;
                }
            }
        }
        forwarded
    }

    /// Apply one command from the bridge.
    pub fn handle(&mut self, cmd: IoCommand) {
        match cmd {
            IoCommand::Write(conn, chunk) => {
                let queue = self.pending.entry(conn).or_default();
                queue.extend(chunk.iter().copied());
                if queue.len() > MAX_PENDING_BYTES {
                    warn!("IO: conn {} write backlog over {} bytes", conn, MAX_PENDING_BYTES);
                    self.drop_conn(conn);
                }
            }
            IoCommand::Close(conn) => {
                // Unsent bytes go out as far as the socket takes them.
                if let Some(mut queue) = self.pending.remove(&conn) {
                    let _ = self.transport.send(conn, queue.make_contiguous());
                }
                self.transport.close(conn);
            }
        }
    }

    /// Write as much pending data as the sockets take.
    pub fn flush_writes(&mut self) {
        let mut failed = Vec::new();
        for (&conn, queue) in &mut self.pending {
            while !queue.is_empty() {
                match self.transport.send(conn, queue.make_contiguous()) {
                    Ok(0) => break,
                    Ok(n) => {
                        queue.drain(..n);
                    }
                    Err(e) => {
                        warn!("IO: write to conn {} failed: {}", conn, e);
                        failed.push(conn);
                        break;
                    }
                }
            }
        }
        self.pending.retain(|_, q| !q.is_empty());
        for conn in failed {
            self.drop_conn(conn);
        }
    }

    /// Bytes waiting for `conn`.
    pub fn pending_bytes(&self, conn: ConnHandle) -> usize {
        self.pending.get(&conn).map_or(0, VecDeque::len)
    }

    /// Close `conn` from this side and tell the bridge it went away.
    fn drop_conn(&mut self, conn: ConnHandle) {
        self.pending.remove(&conn);
        self.transport.close(conn);
        self.backlog.push_back(TransportEvent::Disconnected(conn));
    }
}

// ── Async I/O loop ───────────────────────────────────────────

type SharedPump<T> = Rc<RefCell<IoPump<T>>>;

/// Read task — polls the sockets at 1ms intervals.  The reactor timer is
/// wake-based, so the executor services the write task between ticks.
async fn read_loop<T: Transport>(pump: SharedPump<T>) {
    loop {
        {
            let mut p = pump.borrow_mut();
            p.pump_inbound();
            p.flush_writes();
        }
        async_io_mini::Timer::after(READ_INTERVAL).await;
    }
}

/// Write task — wakes as soon as the bridge queues a command.
async fn write_loop<T: Transport>(pump: SharedPump<T>, channels: &'static IoChannels) {
    loop {
        let cmd = channels.outbound.receive().await;
        let mut p = pump.borrow_mut();
        p.handle(cmd);
        p.flush_writes();
    }
}

/// Entry point for the I/O thread.  Never returns.
fn run_io_loop<T: Transport + 'static>(transport: T, channels: &'static IoChannels) {
    let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
    let pump: SharedPump<T> = Rc::new(RefCell::new(IoPump::new(transport, channels)));

    executor.spawn(read_loop(pump.clone())).detach();
    executor.spawn(write_loop(pump, channels)).detach();

    info!("IO task started (async, reactor-driven)");

    futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
}

// ── Thread spawn ─────────────────────────────────────────────

/// Spawn the I/O task in a dedicated thread pinned to Core 0 (PRO_CPU),
/// next to lwIP.  Takes ownership of the socket transport.
pub fn spawn<T: Transport + Send + 'static>(
    transport: T,
    channels: &'static IoChannels,
) -> Result<std::thread::JoinHandle<()>, BridgeError> {
    spawn_on_core(Core::Pro, 12, 16, "lx200-io\0", move || {
        run_io_loop(transport, channels);
    })
}
