//! Inter-task channels between the I/O thread and the bridge.
//!
//! Uses `embassy-sync` bounded MPMC channels so the async I/O task and
//! the synchronous scheduling loop share state without locks or heap
//! allocation per message.
//!
//! ```text
//! ┌──────────────┐  TransportEvent  ┌──────────────┐
//! │   I/O Task   │─────────────────▶│    Bridge     │
//! │  (async)     │◀─────────────────│  (sync loop)  │
//! └──────────────┘    IoCommand     └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::hal::{Chunk, ConnHandle, TransportEvent};

/// Outbound request from the bridge to the I/O task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoCommand {
    /// Write these bytes to `conn`, in order after earlier writes.
    Write(ConnHandle, Chunk),
    /// Close `conn`.  The I/O task reports nothing back.
    Close(ConnHandle),
}

/// Channel depth for inbound events.
pub const INBOUND_DEPTH: usize = 16;

/// Channel depth for outbound commands.
pub const OUTBOUND_DEPTH: usize = 32;

/// One channel pair.  The device uses [`IO_CHANNELS`]; tests leak their own.
pub struct IoChannels {
    /// I/O task → bridge.
    pub inbound: Channel<CriticalSectionRawMutex, TransportEvent, INBOUND_DEPTH>,
    /// Bridge → I/O task.
    pub outbound: Channel<CriticalSectionRawMutex, IoCommand, OUTBOUND_DEPTH>,
}

impl IoChannels {
    pub const fn new() -> Self {
        Self {
            inbound: Channel::new(),
            outbound: Channel::new(),
        }
    }
}

impl Default for IoChannels {
    fn default() -> Self {
        Self::new()
    }
}

/// The channel pair used on the device.
pub static IO_CHANNELS: IoChannels = IoChannels::new();
