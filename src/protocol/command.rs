//! Opcode table and operand parsing.
//!
//! Each frame body maps onto exactly one [`Opcode`].  Most opcodes are
//! matched on the whole body; `Sr` and `Sd` carry a coordinate operand
//! after the two-letter prefix.

use super::{RequestId, SessionId};
use crate::error::Status;

/// How the arbiter admits a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Answered from a state snapshot; never occupies the slot.
    ReadOnly,
    /// Mutating; waits in the FIFO.
    Queue,
    /// Mutating; replaces a queued predecessor of the same group.
    Supersede(SupersedeGroup),
    /// Stops motion; jumps the queue.
    Stop,
}

/// Commands that replace one another while queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupersedeGroup {
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Bare `0x06`: mount type query.
    Ack,
    GetRa,
    GetDec,
    GetTargetRa,
    GetTargetDec,
    GetStatus,
    DistanceBars,
    GetTrackingRate,
    ProductName,
    FirmwareVersion,
    StatusReport,
    StatusJson,
    SetTargetRa,
    SetTargetDec,
    TrackingOn,
    TrackingOff,
    TrackSidereal,
    TrackSolar,
    TrackLunar,
    RateGuide,
    RateCenter,
    RateFind,
    RateMax,
    Unpark,
    Slew,
    Park,
    MoveNorth,
    MoveSouth,
    MoveEast,
    MoveWest,
    Stop,
}

/// Operand-free opcodes keyed by their full frame body.
const EXACT: &[(&[u8], Opcode)] = &[
    (b"GR", Opcode::GetRa),
    (b"GD", Opcode::GetDec),
    (b"Gr", Opcode::GetTargetRa),
    (b"Gd", Opcode::GetTargetDec),
    (b"GU", Opcode::GetStatus),
    (b"D", Opcode::DistanceBars),
    (b"GT", Opcode::GetTrackingRate),
    (b"GVP", Opcode::ProductName),
    (b"GVN", Opcode::FirmwareVersion),
    (b"GXS", Opcode::StatusReport),
    (b"GXJ", Opcode::StatusJson),
    (b"Te", Opcode::TrackingOn),
    (b"Td", Opcode::TrackingOff),
    (b"TQ", Opcode::TrackSidereal),
    (b"TS", Opcode::TrackSolar),
    (b"TL", Opcode::TrackLunar),
    (b"RG", Opcode::RateGuide),
    (b"RC", Opcode::RateCenter),
    (b"RM", Opcode::RateFind),
    (b"RS", Opcode::RateMax),
    (b"hR", Opcode::Unpark),
    (b"MS", Opcode::Slew),
    (b"hP", Opcode::Park),
    (b"Mn", Opcode::MoveNorth),
    (b"Ms", Opcode::MoveSouth),
    (b"Me", Opcode::MoveEast),
    (b"Mw", Opcode::MoveWest),
    (b"Q", Opcode::Stop),
];

impl Opcode {
    pub const fn class(self) -> CommandClass {
        match self {
            Self::Ack
            | Self::GetRa
            | Self::GetDec
            | Self::GetTargetRa
            | Self::GetTargetDec
            | Self::GetStatus
            | Self::DistanceBars
            | Self::GetTrackingRate
            | Self::ProductName
            | Self::FirmwareVersion
            | Self::StatusReport
            | Self::StatusJson => CommandClass::ReadOnly,
            Self::SetTargetRa
            | Self::SetTargetDec
            | Self::TrackingOn
            | Self::TrackingOff
            | Self::TrackSidereal
            | Self::TrackSolar
            | Self::TrackLunar
            | Self::RateGuide
            | Self::RateCenter
            | Self::RateFind
            | Self::RateMax
            | Self::Unpark => CommandClass::Queue,
            Self::Slew
            | Self::Park
            | Self::MoveNorth
            | Self::MoveSouth
            | Self::MoveEast
            | Self::MoveWest => CommandClass::Supersede(SupersedeGroup::Motion),
            Self::Stop => CommandClass::Stop,
        }
    }

    pub const fn is_mutating(self) -> bool {
        matches!(
            self.class(),
            CommandClass::Queue | CommandClass::Supersede(_)
        )
    }

    /// Mnemonic used in log lines.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::SetTargetRa => "Sr",
            Self::SetTargetDec => "Sd",
            other => EXACT
                .iter()
                .find(|(_, op)| *op == other)
                .and_then(|(body, _)| core::str::from_utf8(body).ok())
                .unwrap_or("?"),
        }
    }
}

/// Decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Right ascension in axis-1 arcseconds (15″ per second of time).
    Ra(i64),
    /// Declination in arcseconds.
    Dec(i64),
}

/// A parsed, immutable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub id: RequestId,
    pub session: SessionId,
    pub opcode: Opcode,
    pub operand: Operand,
    /// Monotonic milliseconds when the frame completed.
    pub arrival_ms: u64,
    /// Per-session frame counter.
    pub seq: u32,
}

impl CommandRequest {
    pub fn class(&self) -> CommandClass {
        self.opcode.class()
    }
}

/// Map a frame body onto an opcode and operand.
pub fn parse_body(body: &[u8]) -> Result<(Opcode, Operand), Status> {
    if let Some(&(_, op)) = EXACT.iter().find(|(b, _)| *b == body) {
        return Ok((op, Operand::None));
    }
    if let Some(rest) = body.strip_prefix(b"Sr") {
        return parse_ra(rest).map(|v| (Opcode::SetTargetRa, Operand::Ra(v)));
    }
    if let Some(rest) = body.strip_prefix(b"Sd") {
        return parse_dec(rest).map(|v| (Opcode::SetTargetDec, Operand::Dec(v)));
    }
    Err(Status::MalformedCommand)
}

/// Read exactly `n` ASCII digits.
fn digits(s: &[u8], n: usize) -> Option<(i64, &[u8])> {
    if s.len() < n {
        return None;
    }
    let (head, tail) = s.split_at(n);
    let mut v = 0i64;
    for &c in head {
        if !c.is_ascii_digit() {
            return None;
        }
        v = v * 10 + i64::from(c - b'0');
    }
    Some((v, tail))
}

/// `HH:MM:SS` or `HH:MM.T` into axis-1 arcseconds.
fn parse_ra(s: &[u8]) -> Result<i64, Status> {
    let bad = Status::MalformedCommand;
    let (h, s) = digits(s, 2).ok_or(bad)?;
    let s = s.strip_prefix(b":").ok_or(bad)?;
    let (m, s) = digits(s, 2).ok_or(bad)?;
    let seconds = match s {
        [b':', rest @ ..] => {
            let (sec, tail) = digits(rest, 2).ok_or(bad)?;
            if !tail.is_empty() || sec > 59 {
                return Err(bad);
            }
            sec
        }
        [b'.', t] if t.is_ascii_digit() => i64::from(t - b'0') * 6,
        _ => return Err(bad),
    };
    if h > 23 || m > 59 {
        return Err(bad);
    }
    Ok((h * 3600 + m * 60 + seconds) * 15)
}

/// `sDD*MM`, `sDD*MM:SS` or `sDD*MM'SS` into arcseconds.  `:` is
/// accepted in place of `*`.  The sign may be omitted.
fn parse_dec(s: &[u8]) -> Result<i64, Status> {
    let bad = Status::MalformedCommand;
    let (sign, s) = match s {
        [b'+', rest @ ..] => (1, rest),
        [b'-', rest @ ..] => (-1, rest),
        _ => (1, s),
    };
    let (d, s) = digits(s, 2).ok_or(bad)?;
    let s = match s {
        [b'*' | b':', rest @ ..] => rest,
        _ => return Err(bad),
    };
    let (m, s) = digits(s, 2).ok_or(bad)?;
    let sec = match s {
        [] => 0,
        [b':' | b'\'', rest @ ..] => {
            let (sec, tail) = digits(rest, 2).ok_or(bad)?;
            if !tail.is_empty() {
                return Err(bad);
            }
            sec
        }
        _ => return Err(bad),
    };
    if m > 59 || sec > 59 {
        return Err(bad);
    }
    let total = d * 3600 + m * 60 + sec;
    if total > 90 * 3600 {
        return Err(bad);
    }
    Ok(sign * total)
}
