//! Mount state and the LX200 reply formats built from it.
//!
//! [`MountState`] is owned by the control loop.  Everything else sees a
//! `Copy` snapshot, and every read-only reply is a pure function of one.

use core::fmt::Write;

use log::warn;
use serde::{Deserialize, Serialize};

use super::fsm::MountMode;
use crate::hal::{AXIS1_TURN_ARCSEC, AxisPair};
use crate::protocol::{PAYLOAD_CAPACITY, Payload, payload};

/// Product string returned by `:GVP#`.
pub const PRODUCT_NAME: &str = "SmartWebServer";

/// Reply to the bare ACK byte: German equatorial mount.
pub const MOUNT_TYPE: &[u8] = b"G";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingRate {
    Sidereal,
    Solar,
    Lunar,
}

impl TrackingRate {
    /// Tracking frequency in the LX200 `:GT#` convention.
    pub const fn hz(self) -> f32 {
        match self {
            Self::Sidereal => 60.1643,
            Self::Solar => 60.0,
            Self::Lunar => 57.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlewRate {
    Guide,
    Center,
    Find,
    Max,
}

impl SlewRate {
    /// Move rate for `M<dir>` commands given the configured maximum.
    pub fn arcsec_per_sec(self, max: u32) -> u32 {
        let divisor = match self {
            Self::Guide => 64,
            Self::Center => 16,
            Self::Find => 4,
            Self::Max => 1,
        };
        (max / divisor).max(1)
    }
}

/// Everything the control loop knows about the mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MountState {
    pub position: AxisPair,
    pub target: AxisPair,
    pub tracking: bool,
    pub tracking_rate: TrackingRate,
    pub parked: bool,
    pub mode: MountMode,
    pub slew_rate: SlewRate,
    pub fault_flags: u8,
}

impl Default for MountState {
    fn default() -> Self {
        Self {
            position: AxisPair::default(),
            target: AxisPair::default(),
            tracking: false,
            tracking_rate: TrackingRate::Sidereal,
            parked: false,
            mode: MountMode::Stopped,
            slew_rate: SlewRate::Max,
            fault_flags: 0,
        }
    }
}

/// Persisted under `mount/park`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkRecord {
    pub parked: bool,
    pub position: AxisPair,
}

type Text = heapless::String<PAYLOAD_CAPACITY>;

fn finish(text: &Text) -> Payload {
    payload(text.as_bytes())
}

/// Axis-1 arcseconds as `HH:MM:SS#`.
pub fn format_ra(axis1: i64) -> Payload {
    let secs = axis1.rem_euclid(AXIS1_TURN_ARCSEC) / 15;
    let mut t = Text::new();
    let _ = write!(t, "{:02}:{:02}:{:02}#", secs / 3600, secs / 60 % 60, secs % 60);
    finish(&t)
}

/// Axis-2 arcseconds as `sDD*MM:SS#`.
pub fn format_dec(axis2: i64) -> Payload {
    let sign = if axis2 < 0 { '-' } else { '+' };
    let a = axis2.abs();
    let mut t = Text::new();
    let _ = write!(t, "{}{:02}*{:02}:{:02}#", sign, a / 3600, a / 60 % 60, a % 60);
    finish(&t)
}

impl MountState {
    pub fn is_slewing(&self) -> bool {
        matches!(self.mode, MountMode::Slewing | MountMode::Parking)
    }

    /// `:GU#` status flags.
    pub fn status_flags(&self) -> Payload {
        let mut t = Text::new();
        if !self.tracking {
            let _ = t.push('n');
        }
        if !self.is_slewing() {
            let _ = t.push('N');
        }
        let _ = t.push(match self.mode {
            MountMode::Parked => 'P',
            MountMode::Parking => 'I',
            _ => 'p',
        });
        let _ = t.push('E');
        if self.fault_flags != 0 {
            let _ = t.push('f');
        }
        let _ = t.push('#');
        finish(&t)
    }

    /// `:D#` distance bars.
    pub fn distance_bars(&self) -> Payload {
        if self.is_slewing() {
            payload(b"\x7f#")
        } else {
            payload(b"#")
        }
    }

    /// `:GT#` tracking frequency.
    pub fn tracking_hz(&self) -> Payload {
        let mut t = Text::new();
        let _ = write!(t, "{:.4}#", self.tracking_rate.hz());
        finish(&t)
    }

    /// `:GXS#` multi-line report.  Lines end in `\n`; the frame ends in `#`.
    pub fn report(&self) -> Payload {
        let mut t = Text::new();
        let ra = format_ra(self.position.axis1);
        let dec = format_dec(self.position.axis2);
        let ra = core::str::from_utf8(&ra[..ra.len() - 1]).unwrap_or("");
        let dec = core::str::from_utf8(&dec[..dec.len() - 1]).unwrap_or("");
        let _ = write!(
            t,
            "RA {}\nDEC {}\nMODE {}\nTRACK {}\nRATE {:?}\nSLEW {:?}\nFAULTS 0x{:02x}#",
            ra,
            dec,
            self.mode.name(),
            if self.tracking { "on" } else { "off" },
            self.tracking_rate,
            self.slew_rate,
            self.fault_flags,
        );
        finish(&t)
    }

    /// `:GXJ#` JSON snapshot for web clients.  A snapshot that does not
    /// fit is replaced by an empty object so the frame stays terminated.
    pub fn json(&self) -> Payload {
        let mut body = serde_json::to_vec(self).unwrap_or_default();
        body.push(b'#');
        Payload::from_slice(&body).unwrap_or_else(|()| {
            warn!("state: {}-byte JSON snapshot over reply capacity", body.len());
            payload(b"{}#")
        })
    }
}
