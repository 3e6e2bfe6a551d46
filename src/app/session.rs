//! Client session manager.
//!
//! Owns the [`Transport`] and every [`Session`].  Nothing else writes to
//! a connection.
//!
//! ```text
//!   Transport ──poll──▶ on_connect / on_bytes / on_disconnect
//!                              │
//!                              ▼  FrameDecoder + CommandParser
//!                        ParseOutcome (requests, rejections)
//!
//!   send_to / broadcast ──▶ per-session outbound queue ──flush──▶ Transport
//! ```
//!
//! ## Backpressure
//!
//! Each session queues at most `response_queue_depth` frames.  When a
//! slow client lets the queue fill, the oldest frame that has not started
//! on the wire is dropped.  A partially written frame is always finished
//! so the client never sees a torn response.
//!
//! ## Admission
//!
//! - Connections beyond `max_sessions` are closed at accept.
//! - Each session has a token bucket (`rate_limit_per_sec`); a request
//!   over the limit becomes a `Busy` rejection and never executes.
//! - `max_protocol_violations` consecutive malformed or oversized frames
//!   mark the session for closing.  Its later input is ignored and it is
//!   closed once the last error has been dispatched.

use core::time::Duration;
use std::collections::{BTreeMap, VecDeque};

use burster::Limiter;
use log::{debug, info, warn};

use super::events::{BridgeEvent, CloseReason};
use super::ports::EventSink;
use crate::adapters::time::platform_now;
use crate::config::BridgeConfig;
use crate::error::Status;
use crate::hal::{ConnHandle, Transport, TransportEvent};
use crate::protocol::codec::FrameDecoder;
use crate::protocol::parser::{CommandParser, ParseOutcome};
use crate::protocol::{RequestId, SessionId, WireFrame};

type RateLimiter = burster::TokenBucket<fn() -> Duration>;

struct OutFrame {
    bytes: WireFrame,
    /// Bytes already accepted by the transport.
    sent: usize,
}

/// One connected client.
pub struct Session {
    id: SessionId,
    conn: ConnHandle,
    decoder: FrameDecoder,
    last_activity_ms: u64,
    /// Most recent frame still waiting for its terminal response.
    pending: Option<RequestId>,
    outbound: VecDeque<OutFrame>,
    violations: u8,
    next_seq: u32,
    limiter: Option<RateLimiter>,
    closing: Option<CloseReason>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn conn(&self) -> ConnHandle {
        self.conn
    }

    pub fn pending(&self) -> Option<RequestId> {
        self.pending
    }

    pub fn queued_frames(&self) -> usize {
        self.outbound.len()
    }

    pub fn violations(&self) -> u8 {
        self.violations
    }

    fn allow_request(&mut self) -> bool {
        match self.limiter.as_mut() {
            Some(bucket) => bucket.try_consume(1).is_ok(),
            None => true,
        }
    }
}

/// Result of queuing a frame for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after dropping the oldest unsent frame.
    QueuedDroppedOldest,
    /// No such session.
    NoSession,
}

pub struct SessionManager<T: Transport> {
    transport: T,
    sessions: BTreeMap<SessionId, Session>,
    by_conn: BTreeMap<ConnHandle, SessionId>,
    next_id: SessionId,
    max_frame_len: usize,
    max_sessions: usize,
    queue_depth: usize,
    idle_timeout_ms: u64,
    rate_limit: u16,
    max_violations: u8,
}

impl<T: Transport> SessionManager<T> {
    pub fn new(transport: T, config: &BridgeConfig) -> Self {
        Self {
            transport,
            sessions: BTreeMap::new(),
            by_conn: BTreeMap::new(),
            next_id: 1,
            max_frame_len: config.max_frame_len,
            max_sessions: config.max_sessions,
            queue_depth: config.response_queue_depth,
            idle_timeout_ms: u64::from(config.session_idle_timeout_ms),
            rate_limit: config.rate_limit_per_sec,
            max_violations: config.max_protocol_violations,
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Drain every pending transport event, feeding bytes through the
    /// parser.  Outcomes are appended to `out` in arrival order.
    pub fn poll_transport(
        &mut self,
        now_ms: u64,
        parser: &mut CommandParser,
        out: &mut Vec<ParseOutcome>,
        sink: &mut impl EventSink,
    ) {
        while let Some(event) = self.transport.poll() {
            match event {
                TransportEvent::Connected(conn) => {
                    self.on_connect(conn, now_ms, sink);
                }
                TransportEvent::Received(conn, chunk) => {
                    if let Some(&id) = self.by_conn.get(&conn) {
                        self.on_bytes(id, &chunk, now_ms, parser, out);
                    }
                }
                TransportEvent::Disconnected(conn) => {
                    if let Some(&id) = self.by_conn.get(&conn) {
                        self.on_disconnect(id, sink);
                    }
                }
            }
        }
    }

    /// Register a new connection.  Returns `None` when the session limit
    /// is reached; the connection is closed in that case.
    pub fn on_connect(
        &mut self,
        conn: ConnHandle,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Option<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            warn!("sessions: limit {} reached, refusing conn {}", self.max_sessions, conn);
            self.transport.close(conn);
            sink.emit(&BridgeEvent::ConnectionRefused(conn));
            return None;
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let limiter = (self.rate_limit > 0).then(|| {
            let rate = u64::from(self.rate_limit);
            burster::TokenBucket::new_with_time_provider(rate, rate, platform_now as fn() -> Duration)
        });
        self.sessions.insert(
            id,
            Session {
                id,
                conn,
                decoder: FrameDecoder::new(self.max_frame_len),
                last_activity_ms: now_ms,
                pending: None,
                outbound: VecDeque::with_capacity(self.queue_depth),
                violations: 0,
                next_seq: 0,
                limiter,
                closing: None,
            },
        );
        self.by_conn.insert(conn, id);
        info!("sessions: session {} opened on conn {}", id, conn);
        sink.emit(&BridgeEvent::SessionOpened { session: id, conn });
        Some(id)
    }

    /// The client went away.  Motion it started keeps going.
    pub fn on_disconnect(&mut self, id: SessionId, sink: &mut impl EventSink) {
        if let Some(session) = self.sessions.remove(&id) {
            self.by_conn.remove(&session.conn);
            info!("sessions: session {} disconnected", id);
            sink.emit(&BridgeEvent::SessionClosed {
                session: id,
                reason: CloseReason::Disconnected,
            });
        }
    }

    /// Feed inbound bytes for session `id`.
    ///
    /// Once a session is marked for closing its further frames are
    /// discarded, including the rest of the chunk that tripped the limit.
    pub fn on_bytes(
        &mut self,
        id: SessionId,
        bytes: &[u8],
        now_ms: u64,
        parser: &mut CommandParser,
        out: &mut Vec<ParseOutcome>,
    ) {
        let max_violations = self.max_violations;
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if session.closing.is_some() {
            return;
        }
        session.last_activity_ms = now_ms;

        let start = out.len();
        parser.feed(id, &mut session.decoder, &mut session.next_seq, bytes, now_ms, out);

        let mut keep = out.len();
        for (i, outcome) in out[start..].iter_mut().enumerate() {
            session.pending = Some(outcome.request_id());
            match outcome {
                ParseOutcome::Request(req) => {
                    session.violations = 0;
                    if !session.allow_request() {
                        debug!("sessions: session {} rate limited", id);
                        let (request_id, arrival_ms, seq) = (req.id, req.arrival_ms, req.seq);
                        *outcome = ParseOutcome::Reject {
                            request_id,
                            session: id,
                            status: Status::Busy,
                            arrival_ms,
                            seq,
                        };
                    }
                }
                ParseOutcome::Reject { .. } => {
                    session.violations = session.violations.saturating_add(1);
                    if session.violations >= max_violations {
                        warn!(
                            "sessions: session {} hit {} protocol violations",
                            id, session.violations
                        );
                        session.closing = Some(CloseReason::ProtocolViolation);
                        keep = start + i + 1;
                        break;
                    }
                }
            }
        }
        if keep < out.len() {
            debug!(
                "sessions: session {} closing, {} frames discarded",
                id,
                out.len() - keep
            );
            out.truncate(keep);
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Queue `bytes` for session `id` and write as much as the transport
    /// takes right now.
    pub fn send_to(&mut self, id: SessionId, bytes: WireFrame) -> Delivery {
        let depth = self.queue_depth;
        let Some(session) = self.sessions.get_mut(&id) else {
            return Delivery::NoSession;
        };
        let mut delivery = Delivery::Queued;
        if session.outbound.len() >= depth {
            let victim = match session.outbound.front() {
                Some(front) if front.sent > 0 => 1,
                _ => 0,
            };
            if session.outbound.remove(victim).is_some() {
                delivery = Delivery::QueuedDroppedOldest;
            }
        }
        session.outbound.push_back(OutFrame { bytes, sent: 0 });
        Self::flush_session(&mut self.transport, session);
        delivery
    }

    /// Queue `bytes` for every session.  Returns the sessions that had to
    /// drop a frame to make room.
    pub fn broadcast(&mut self, bytes: &WireFrame) -> Vec<SessionId> {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.into_iter()
            .filter(|&id| self.send_to(id, bytes.clone()) == Delivery::QueuedDroppedOldest)
            .collect()
    }

    /// Clear `id`'s pending token if it matches `request_id`.
    pub fn settle(&mut self, id: SessionId, request_id: RequestId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            if session.pending == Some(request_id) {
                session.pending = None;
            }
        }
    }

    fn flush_session(transport: &mut T, session: &mut Session) {
        while let Some(front) = session.outbound.front_mut() {
            match transport.send(session.conn, &front.bytes[front.sent..]) {
                Ok(0) => break,
                Ok(n) => {
                    front.sent += n;
                    if front.sent >= front.bytes.len() {
                        session.outbound.pop_front();
                    }
                }
                Err(e) => {
                    warn!("sessions: write to session {} failed ({})", session.id, e);
                    session.outbound.clear();
                    session.closing.get_or_insert(CloseReason::TransportError);
                    break;
                }
            }
        }
    }

    /// Retry queued writes everywhere and close sessions marked for closing.
    pub fn flush_all(&mut self, sink: &mut impl EventSink) {
        for session in self.sessions.values_mut() {
            Self::flush_session(&mut self.transport, session);
        }
        // A violating session is closed once its last error is answered.
        let closing: Vec<(SessionId, CloseReason)> = self
            .sessions
            .values()
            .filter_map(|s| match s.closing {
                Some(CloseReason::ProtocolViolation) if s.pending.is_some() => None,
                reason => reason.map(|r| (s.id, r)),
            })
            .collect();
        for (id, reason) in closing {
            self.close(id, reason, sink);
        }
    }

    /// Close sessions with no inbound traffic for the idle timeout.
    pub fn reap_idle(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        let idle: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| now_ms.saturating_sub(s.last_activity_ms) >= self.idle_timeout_ms)
            .map(|s| s.id)
            .collect();
        for id in idle {
            self.close(id, CloseReason::IdleTimeout, sink);
        }
    }

    /// Close session `id` from the bridge side.
    pub fn close(&mut self, id: SessionId, reason: CloseReason, sink: &mut impl EventSink) {
        if let Some(session) = self.sessions.remove(&id) {
            self.by_conn.remove(&session.conn);
            self.transport.close(session.conn);
            info!("sessions: session {} closed ({:?})", id, reason);
            sink.emit(&BridgeEvent::SessionClosed { session: id, reason });
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn session_for_conn(&self, conn: ConnHandle) -> Option<SessionId> {
        self.by_conn.get(&conn).copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
