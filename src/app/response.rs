//! Response events: what the parser, arbiter and control loop produce
//! and the dispatcher consumes exactly once.

use std::collections::VecDeque;

use crate::error::Status;
use crate::protocol::codec::encode_response;
use crate::protocol::{Payload, RequestId, SessionId, WireFrame};

/// Where a response goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Session(SessionId),
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEvent {
    pub target: Target,
    /// `None` for unsolicited broadcasts.
    pub request_id: Option<RequestId>,
    pub status: Status,
    pub payload: Payload,
}

impl ResponseEvent {
    /// Status with no payload, for `session`'s request `request_id`.
    pub fn status(session: SessionId, request_id: RequestId, status: Status) -> Self {
        Self::reply(session, request_id, status, Payload::new())
    }

    pub fn reply(session: SessionId, request_id: RequestId, status: Status, payload: Payload) -> Self {
        Self {
            target: Target::Session(session),
            request_id: Some(request_id),
            status,
            payload,
        }
    }

    /// Unsolicited notification for every session.
    pub fn broadcast(payload: Payload) -> Self {
        Self {
            target: Target::Broadcast,
            request_id: None,
            status: Status::Ok,
            payload,
        }
    }

    /// Wire bytes for this event, or `None` when nothing is written.
    pub fn encode(&self) -> Option<WireFrame> {
        encode_response(self.status, &self.payload)
    }
}

/// Events awaiting dispatch, in production order.
pub type ResponseQueue = VecDeque<ResponseEvent>;
