//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields a body over the configured
//! limit, and decodes the same frames whether the input arrives whole or
//! split at an arbitrary point.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartwebserver::protocol::codec::{Frame, FrameDecoder};

const MAX_LEN: usize = 32;

fn decode(parts: &[&[u8]]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new(MAX_LEN);
    let mut frames = Vec::new();
    for part in parts {
        decoder.feed(part, |f| frames.push(f));
    }
    assert!(decoder.pending() <= MAX_LEN, "partial body over limit");
    frames
}

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let whole = decode(&[rest]);
    for frame in &whole {
        if let Frame::Body(body) = frame {
            assert!(body.len() <= MAX_LEN, "body exceeds max_frame_len");
            assert!(!body.contains(&b'#'), "terminator leaked into body");
        }
    }

    let at = usize::from(split) % (rest.len() + 1);
    let (a, b) = rest.split_at(at);
    assert_eq!(whole, decode(&[a, b]), "chunking changed the decoded frames");
});
