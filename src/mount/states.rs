//! Mode handler functions and table builder.
//!
//! ```text
//!            ┌──────[Te]──────┐
//!            ▼                │
//!  STOPPED ◀──[Td]──▶ TRACKING
//!     │  ▲               │  ▲
//!  [MS / M*]  [arrived / Q]  │
//!     ▼  │               ▼  │
//!  SLEWING · MOVING ─────────┘
//!
//!  any ──[hP]──▶ PARKING ──[arrived]──▶ PARKED ──[hR]──▶ STOPPED
//! ```
//!
//! The handlers only observe: the control loop has already applied the
//! command that caused the change.

use log::{info, warn};

use super::fsm::{ModeContext, ModeDescriptor, MountMode};
use crate::drivers::led_patterns::PatternId;
use crate::hal::MotionStatus;

/// Build the static mode table.  Called once at startup.
pub fn build_mode_table() -> [ModeDescriptor; MountMode::COUNT] {
    [
        ModeDescriptor {
            id: MountMode::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: None,
            on_update: stopped_update,
        },
        ModeDescriptor {
            id: MountMode::Tracking,
            name: "Tracking",
            on_enter: Some(tracking_enter),
            on_exit: None,
            on_update: tracking_update,
        },
        ModeDescriptor {
            id: MountMode::Slewing,
            name: "Slewing",
            on_enter: Some(slewing_enter),
            on_exit: None,
            on_update: slewing_update,
        },
        ModeDescriptor {
            id: MountMode::Moving,
            name: "Moving",
            on_enter: Some(moving_enter),
            on_exit: None,
            on_update: moving_update,
        },
        ModeDescriptor {
            id: MountMode::Parking,
            name: "Parking",
            on_enter: Some(parking_enter),
            on_exit: Some(parking_exit),
            on_update: parking_update,
        },
        ModeDescriptor {
            id: MountMode::Parked,
            name: "Parked",
            on_enter: Some(parked_enter),
            on_exit: Some(parked_exit),
            on_update: parked_update,
        },
    ]
}

/// The mode the observed context calls for.
fn observed(ctx: &ModeContext) -> MountMode {
    if ctx.parked {
        return MountMode::Parked;
    }
    match ctx.motion {
        MotionStatus::Slewing if ctx.parking => MountMode::Parking,
        MotionStatus::Slewing => MountMode::Slewing,
        MotionStatus::Moving => MountMode::Moving,
        MotionStatus::Idle | MotionStatus::Fault if ctx.tracking => MountMode::Tracking,
        MotionStatus::Idle | MotionStatus::Fault => MountMode::Stopped,
    }
}

fn leave_unless(ctx: &ModeContext, current: MountMode) -> Option<MountMode> {
    let next = observed(ctx);
    (next != current).then_some(next)
}

// ── STOPPED ───────────────────────────────────────────────────

fn stopped_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::Off;
}

fn stopped_update(ctx: &mut ModeContext) -> Option<MountMode> {
    leave_unless(ctx, MountMode::Stopped)
}

// ── TRACKING ──────────────────────────────────────────────────

fn tracking_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::Solid;
}

fn tracking_update(ctx: &mut ModeContext) -> Option<MountMode> {
    leave_unless(ctx, MountMode::Tracking)
}

// ── SLEWING ───────────────────────────────────────────────────

fn slewing_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::FastBlink;
}

fn slewing_update(ctx: &mut ModeContext) -> Option<MountMode> {
    if ctx.motion == MotionStatus::Fault {
        warn!("SLEWING: drive fault after {} ticks", ctx.ticks_in_mode);
    }
    leave_unless(ctx, MountMode::Slewing)
}

// ── MOVING ────────────────────────────────────────────────────

fn moving_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::SlowBlink;
}

fn moving_update(ctx: &mut ModeContext) -> Option<MountMode> {
    leave_unless(ctx, MountMode::Moving)
}

// ── PARKING ───────────────────────────────────────────────────

fn parking_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::FastBlink;
    info!("PARKING: heading for park position");
}

fn parking_exit(ctx: &mut ModeContext) {
    if !ctx.parked {
        warn!("PARKING: park abandoned after {} ticks", ctx.ticks_in_mode);
    }
}

fn parking_update(ctx: &mut ModeContext) -> Option<MountMode> {
    leave_unless(ctx, MountMode::Parking)
}

// ── PARKED ────────────────────────────────────────────────────

fn parked_enter(ctx: &mut ModeContext) {
    ctx.led = PatternId::DoubleBlink;
    info!("PARKED: drives disabled");
}

fn parked_exit(_ctx: &mut ModeContext) {
    info!("PARKED: unparked");
}

fn parked_update(ctx: &mut ModeContext) -> Option<MountMode> {
    // Only an unpark leaves Parked.
    if ctx.parked {
        return None;
    }
    Some(observed(ctx))
}
