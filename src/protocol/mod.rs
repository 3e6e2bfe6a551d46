//! LX200-family command protocol.
//!
//! ```text
//!  bytes ──▶ FrameDecoder ──▶ Frame ──▶ CommandParser ──▶ CommandRequest
//!            (codec)                    (opcode table,     or rejection
//!                                        operand parsing)
//! ```
//!
//! Frames are `:` + body + `#`.  The single byte `0x06` outside a frame is
//! the ACK query and stands alone.

pub mod codec;
pub mod command;
pub mod parser;

/// Identifies one client session for its lifetime.
pub type SessionId = u32;

/// Correlates a request with its response events.
pub type RequestId = u32;

/// Hard upper bound for `max_frame_len`.
pub const FRAME_CAPACITY: usize = 64;

/// Largest reply body a single command can produce.
pub const PAYLOAD_CAPACITY: usize = 384;

/// Reply body bytes, written verbatim on success.
pub type Payload = heapless::Vec<u8, PAYLOAD_CAPACITY>;

/// One encoded outbound frame.
pub type WireFrame = heapless::Vec<u8, PAYLOAD_CAPACITY>;

/// Build a [`Payload`] from bytes that are known to fit.
///
/// Replies whose size depends on runtime data must check with
/// `Payload::from_slice` instead.
pub fn payload(bytes: &[u8]) -> Payload {
    debug_assert!(
        bytes.len() <= PAYLOAD_CAPACITY,
        "{}-byte payload over capacity",
        bytes.len()
    );
    let n = bytes.len().min(PAYLOAD_CAPACITY);
    Payload::from_slice(&bytes[..n]).unwrap_or_default()
}
