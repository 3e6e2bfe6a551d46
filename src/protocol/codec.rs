//! LX200 frame codec.
//!
//! Wire format:
//! ```text
//! ┌───┬──────────────────────┬───┐
//! │ : │ body (≤ max_frame_len)│ # │        0x06   (ACK, stands alone)
//! └───┴──────────────────────┴───┘
//! ```
//!
//! The decoder accumulates bytes per session and yields complete frames.
//! A single transport read may hold part of a frame, several frames, or
//! line noise between frames.  Noise outside a frame is ignored.  Inside a
//! frame `:` is an ordinary body byte, since coordinate operands such as
//! `Sr12:34:56` contain it.  A body that grows past `max_frame_len`
//! without a `#` is discarded and reported once as [`Frame::TooLong`];
//! the decoder then waits for the next `:`.

use super::{FRAME_CAPACITY, Payload, WireFrame};
use crate::error::Status;

pub const FRAME_START: u8 = b':';
pub const FRAME_END: u8 = b'#';
/// LX200 ACK query byte.
pub const ACK: u8 = 0x06;

/// Frame body without delimiters.
pub type FrameBody = heapless::Vec<u8, FRAME_CAPACITY>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Bare ACK byte.
    Ack,
    /// Body of a `:...#` frame.
    Body(FrameBody),
    /// A frame overran the limit and was dropped.
    TooLong,
}

enum DecoderState {
    /// Waiting for `:` or ACK.
    Idle,
    /// Inside a frame, collecting body bytes.
    InFrame,
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    body: FrameBody,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            state: DecoderState::Idle,
            body: FrameBody::new(),
            max_len: max_frame_len.clamp(1, FRAME_CAPACITY),
        }
    }

    /// Feed one byte.  Returns a frame when one completes.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecoderState::Idle => match byte {
                FRAME_START => {
                    self.body.clear();
                    self.state = DecoderState::InFrame;
                    None
                }
                ACK => Some(Frame::Ack),
                _ => None,
            },
            DecoderState::InFrame => match byte {
                FRAME_END => {
                    self.state = DecoderState::Idle;
                    Some(Frame::Body(core::mem::take(&mut self.body)))
                }
                _ => {
                    if self.body.len() >= self.max_len || self.body.push(byte).is_err() {
                        self.reset();
                        return Some(Frame::TooLong);
                    }
                    None
                }
            },
        }
    }

    /// Feed a chunk, calling `on_frame` for every frame it completes.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(Frame)) {
        for &b in data {
            if let Some(frame) = self.push(b) {
                on_frame(frame);
            }
        }
    }

    /// Bytes buffered for the frame in progress.
    pub fn pending(&self) -> usize {
        self.body.len()
    }

    /// Drop any partial frame (e.g. after a reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::Idle;
        self.body.clear();
    }
}

/// Encode a response for the wire.
///
/// Errors become `E:<Status>#`.  Successes write `payload` verbatim, so
/// an empty payload writes nothing and yields `None`.
pub fn encode_response(status: Status, payload: &Payload) -> Option<WireFrame> {
    let mut out = WireFrame::new();
    if status.is_error() {
        out.extend_from_slice(b"E:").ok()?;
        out.extend_from_slice(status.name().as_bytes()).ok()?;
        out.push(FRAME_END).ok()?;
        return Some(out);
    }
    if payload.is_empty() {
        return None;
    }
    out.extend_from_slice(payload).ok()?;
    Some(out)
}
