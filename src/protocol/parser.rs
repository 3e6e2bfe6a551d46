//! Turns a session's raw bytes into command requests.
//!
//! The parser itself is stateless apart from the request-id counter; the
//! partial-frame state lives in each session's [`FrameDecoder`] so one
//! parser serves every connection.

use log::debug;

use super::codec::{Frame, FrameDecoder};
use super::command::{CommandRequest, Opcode, Operand, parse_body};
use super::{RequestId, SessionId};
use crate::error::Status;

/// One result of feeding bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Request(CommandRequest),
    /// Never executed; answered in its place among the session's replies.
    Reject {
        request_id: RequestId,
        session: SessionId,
        status: Status,
        arrival_ms: u64,
        seq: u32,
    },
}

impl ParseOutcome {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Request(r) => r.session,
            Self::Reject { session, .. } => *session,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Request(r) => r.id,
            Self::Reject { request_id, .. } => *request_id,
        }
    }

    /// Arbitration order: arrival time, then session, then sequence.
    pub fn order_key(&self) -> (u64, SessionId, u32) {
        match self {
            Self::Request(r) => (r.arrival_ms, r.session, r.seq),
            Self::Reject {
                arrival_ms,
                session,
                seq,
                ..
            } => (*arrival_ms, *session, *seq),
        }
    }
}

pub struct CommandParser {
    next_request_id: RequestId,
}

impl CommandParser {
    pub fn new() -> Self {
        Self { next_request_id: 1 }
    }

    fn alloc_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Feed `bytes` from `session`, appending 0..N outcomes to `out`.
    ///
    /// `seq` is the session's frame counter; every frame consumed (valid
    /// or not) advances it.
    pub fn feed(
        &mut self,
        session: SessionId,
        decoder: &mut FrameDecoder,
        seq: &mut u32,
        bytes: &[u8],
        now_ms: u64,
        out: &mut Vec<ParseOutcome>,
    ) {
        decoder.feed(bytes, |frame| {
            let request_id = self.alloc_id();
            let frame_seq = *seq;
            *seq = seq.wrapping_add(1);
            let parsed = match frame {
                Frame::Ack => Ok((Opcode::Ack, Operand::None)),
                Frame::Body(body) => parse_body(&body),
                Frame::TooLong => Err(Status::FrameTooLong),
            };
            match parsed {
                Ok((opcode, operand)) => out.push(ParseOutcome::Request(CommandRequest {
                    id: request_id,
                    session,
                    opcode,
                    operand,
                    arrival_ms: now_ms,
                    seq: frame_seq,
                })),
                Err(status) => {
                    debug!("parser: session {} frame rejected ({})", session, status);
                    out.push(ParseOutcome::Reject {
                        request_id,
                        session,
                        status,
                        arrival_ms: now_ms,
                        seq: frame_seq,
                    });
                }
            }
        });
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}
