//! Fuzz target: `parse_body`
//!
//! Any frame body either maps onto an opcode or is rejected as
//! `MalformedCommand`; coordinates that parse are always in range.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use smartwebserver::error::Status;
use smartwebserver::protocol::command::{Operand, parse_body};

fuzz_target!(|body: &[u8]| {
    match parse_body(body) {
        Ok((_, Operand::Ra(v))) => assert!((0..24 * 3600 * 15).contains(&v)),
        Ok((_, Operand::Dec(v))) => assert!((-90 * 3600..=90 * 3600).contains(&v)),
        Ok((_, Operand::None)) => {}
        Err(status) => assert_eq!(status, Status::MalformedCommand),
    }
});
