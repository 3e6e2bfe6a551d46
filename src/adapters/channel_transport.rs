//! [`Transport`] over the I/O task channels.
//!
//! The bridge never touches a socket on the device: it polls inbound
//! events from, and queues writes to, the channels in
//! [`channels`](super::channels).  A write is "accepted" once its bytes
//! are in the outbound channel; when the channel is full `send` accepts
//! fewer bytes (possibly zero) and the session manager retries later.

use std::collections::BTreeSet;

use log::{debug, warn};

use super::channels::{IoChannels, IoCommand};
use crate::error::TransportError;
use crate::hal::{CHUNK_SIZE, Chunk, ConnHandle, Transport, TransportEvent};

pub struct ChannelTransport {
    channels: &'static IoChannels,
    open: BTreeSet<ConnHandle>,
    /// Close requests that did not fit in the channel yet.
    pending_close: Vec<ConnHandle>,
}

impl ChannelTransport {
    pub fn new(channels: &'static IoChannels) -> Self {
        Self {
            channels,
            open: BTreeSet::new(),
            pending_close: Vec::new(),
        }
    }

    fn retry_closes(&mut self) {
        while let Some(&conn) = self.pending_close.last() {
            if self.channels.outbound.try_send(IoCommand::Close(conn)).is_err() {
                break;
            }
            self.pending_close.pop();
        }
    }
}

impl Transport for ChannelTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        self.retry_closes();
        loop {
            let event = self.channels.inbound.try_receive().ok()?;
            match &event {
                TransportEvent::Connected(conn) => {
                    self.open.insert(*conn);
                }
                TransportEvent::Disconnected(conn) => {
                    if !self.open.remove(conn) {
                        continue;
                    }
                }
                TransportEvent::Received(conn, _) => {
                    // Bytes still in flight for a connection we closed.
                    if !self.open.contains(conn) {
                        debug!("chan: dropping bytes for closed conn {}", conn);
                        continue;
                    }
                }
            }
            return Some(event);
        }
    }

    fn send(&mut self, conn: ConnHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        if !self.open.contains(&conn) {
            return Err(TransportError::NotConnected);
        }
        let mut accepted = 0;
        for piece in bytes.chunks(CHUNK_SIZE) {
            let mut chunk = Chunk::new();
            // `piece` is at most CHUNK_SIZE long
            let _ = chunk.extend_from_slice(piece);
            if self
                .channels
                .outbound
                .try_send(IoCommand::Write(conn, chunk))
                .is_err()
            {
                break;
            }
            accepted += piece.len();
        }
        Ok(accepted)
    }

    fn close(&mut self, conn: ConnHandle) {
        if !self.open.remove(&conn) {
            return;
        }
        if self.channels.outbound.try_send(IoCommand::Close(conn)).is_err() {
            warn!("chan: outbound full, close of conn {} deferred", conn);
            self.pending_close.push(conn);
        }
    }
}
