//! LX200-over-TCP server adapter.
//!
//! Implements the [`Transport`] capability on a non-blocking
//! `std::net::TcpListener`.  On the device `std::net` sits on lwIP, so
//! the same code runs on both targets; the host build is what the
//! integration tests talk to over loopback.
//!
//! ## Connection model
//!
//! 1. [`TcpServer::bind`] listens on `0.0.0.0:<port>` in non-blocking mode.
//! 2. Each [`poll`](Transport::poll) sweep accepts every waiting client,
//!    then reads at most one chunk from each open connection.
//! 3. Reads and writes never block; `send` returns `Ok(0)` when the
//!    socket buffer is full.
//! 4. EOF or a socket error surfaces as `Disconnected`.

use std::collections::{BTreeMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{info, warn};

use crate::error::TransportError;
use crate::hal::{CHUNK_SIZE, Chunk, ConnHandle, Transport, TransportEvent};

/// Hard cap on open sockets; the session manager applies the real limit.
pub const MAX_CONNECTIONS: usize = 16;

pub struct TcpServer {
    listener: TcpListener,
    streams: BTreeMap<ConnHandle, TcpStream>,
    next_conn: ConnHandle,
    events: VecDeque<TransportEvent>,
}

impl TcpServer {
    /// Listen on `0.0.0.0:<port>`.  Port `0` lets the OS pick one
    /// (see [`local_addr`](Self::local_addr)).
    pub fn bind(port: u16) -> Result<Self, TransportError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr).map_err(|e| {
            warn!("TCP: bind {} failed: {}", addr, e);
            TransportError::Bind
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|_| TransportError::Bind)?;
        info!("TCP: listening on port {}", port);
        Ok(Self {
            listener,
            streams: BTreeMap::new(),
            next_conn: 1,
            events: VecDeque::new(),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(|_| TransportError::Io)
    }

    pub fn is_connected(&self, conn: ConnHandle) -> bool {
        self.streams.contains_key(&conn)
    }

    pub fn connections(&self) -> usize {
        self.streams.len()
    }

    fn alloc_conn(&mut self) -> ConnHandle {
        loop {
            let conn = self.next_conn;
            self.next_conn = self.next_conn.wrapping_add(1).max(1);
            if !self.streams.contains_key(&conn) {
                return conn;
            }
        }
    }

    fn accept_waiting(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if self.streams.len() >= MAX_CONNECTIONS {
                        warn!("TCP: {} refused, {} sockets open", addr, MAX_CONNECTIONS);
                        continue;
                    }
                    if stream.set_nonblocking(true).is_err() {
                        warn!("TCP: failed to set non-blocking on {}", addr);
                        continue;
                    }
                    // LX200 replies are tiny; don't let Nagle hold them back.
                    let _ = stream.set_nodelay(true);
                    let conn = self.alloc_conn();
                    info!("TCP: conn {} from {}", conn, addr);
                    self.streams.insert(conn, stream);
                    self.events.push_back(TransportEvent::Connected(conn));
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("TCP: accept error: {}", e);
                    break;
                }
            }
        }
    }

    fn read_all(&mut self) {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut dead = Vec::new();
        for (&conn, stream) in &mut self.streams {
            match stream.read(&mut buf) {
                Ok(0) => {
                    info!("TCP: conn {} closed by peer", conn);
                    dead.push(conn);
                }
                Ok(n) => {
                    let mut chunk = Chunk::new();
                    // n <= CHUNK_SIZE
                    let _ = chunk.extend_from_slice(&buf[..n]);
                    self.events.push_back(TransportEvent::Received(conn, chunk));
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => {
                    warn!("TCP: conn {} read error: {}", conn, e);
                    dead.push(conn);
                }
            }
        }
        for conn in dead {
            self.streams.remove(&conn);
            self.events.push_back(TransportEvent::Disconnected(conn));
        }
    }
}

impl Transport for TcpServer {
    fn poll(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.accept_waiting();
            self.read_all();
        }
        self.events.pop_front()
    }

    fn send(&mut self, conn: ConnHandle, bytes: &[u8]) -> Result<usize, TransportError> {
        let stream = self
            .streams
            .get_mut(&conn)
            .ok_or(TransportError::NotConnected)?;
        match stream.write(bytes) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                warn!("TCP: conn {} write error: {}", conn, e);
                self.streams.remove(&conn);
                Err(TransportError::Io)
            }
        }
    }

    fn close(&mut self, conn: ConnHandle) {
        if let Some(stream) = self.streams.remove(&conn) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            info!("TCP: conn {} closed", conn);
        }
    }
}
