//! Outbound bridge events.
//!
//! The bridge emits these through the [`EventSink`](super::ports::EventSink)
//! port.  They describe what happened; they are never on the wire.

use crate::error::Status;
use crate::hal::ConnHandle;
use crate::mount::fsm::MountMode;
use crate::protocol::command::Opcode;
use crate::protocol::{RequestId, SessionId};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client hung up.
    Disconnected,
    /// No inbound bytes within `session_idle_timeout_ms`.
    IdleTimeout,
    /// Too many consecutive malformed or oversized frames.
    ProtocolViolation,
    /// The transport failed a write.
    TransportError,
}

/// Structured events emitted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The bridge has started (carries the initial mount mode).
    Started(MountMode),

    SessionOpened { session: SessionId, conn: ConnHandle },

    SessionClosed { session: SessionId, reason: CloseReason },

    /// A connection arrived while `max_sessions` were open.
    ConnectionRefused(ConnHandle),

    /// A mutating command entered the command slot.
    CommandAccepted {
        request_id: RequestId,
        session: SessionId,
        opcode: Opcode,
    },

    /// A request ended with an error status.
    CommandRejected {
        request_id: RequestId,
        session: SessionId,
        status: Status,
    },

    /// A request ended successfully.
    CommandCompleted {
        request_id: RequestId,
        session: SessionId,
        status: Status,
    },

    /// The mount-mode FSM transitioned.
    ModeChanged { from: MountMode, to: MountMode },

    /// One or more limit faults were raised (bitmask).
    LimitFault(u8),

    /// All limit faults have cleared.
    LimitCleared,

    /// A slow session's oldest queued response was dropped.
    ResponseDropped { session: SessionId },

    /// A response arrived for a session that no longer exists.
    ResponseDiscarded {
        session: SessionId,
        request_id: Option<RequestId>,
    },
}
