//! Function-pointer finite state machine for the mount mode.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ModeTable                                               │
//! │  ┌──────────┬───────────┬──────────┬──────────────────┐  │
//! │  │ Mode     │ on_enter  │ on_exit  │ on_update        │  │
//! │  ├──────────┼───────────┼──────────┼──────────────────┤  │
//! │  │ Stopped  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  │ Tracking │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  │ Slewing  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  │ Moving   │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  │ Parking  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  │ Parked   │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>│  │
//! │  └──────────┴───────────┴──────────┴──────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** mode.  If it
//! returns `Some(next)`, the engine runs `on_exit` for the current mode,
//! then `on_enter` for the next.  The mode is derived from what the
//! control loop observed this tick; it never drives the hardware itself,
//! only the status LED pattern.

use log::info;
use serde::Serialize;

use crate::drivers::led_patterns::PatternId;
use crate::hal::MotionStatus;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the table built in
/// [`build_mode_table`](super::states::build_mode_table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum MountMode {
    Stopped = 0,
    Tracking = 1,
    Slewing = 2,
    Moving = 3,
    Parking = 4,
    Parked = 5,
}

impl MountMode {
    pub const COUNT: usize = 6;

    /// Convert an index back to a mode.  Out-of-range maps to `Stopped`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Stopped,
            1 => Self::Tracking,
            2 => Self::Slewing,
            3 => Self::Moving,
            4 => Self::Parking,
            5 => Self::Parked,
            _ => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::Stopped
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Tracking => "Tracking",
            Self::Slewing => "Slewing",
            Self::Moving => "Moving",
            Self::Parking => "Parking",
            Self::Parked => "Parked",
        }
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What the mode handlers see.  Refreshed by the control loop before
/// every FSM tick.
#[derive(Debug, Clone, Copy)]
pub struct ModeContext {
    pub ticks_in_mode: u64,
    pub total_ticks: u64,
    pub motion: MotionStatus,
    pub tracking: bool,
    pub parked: bool,
    /// A park goto is executing.
    pub parking: bool,
    pub fault_flags: u8,
    /// Written by `on_enter`; applied to the status LED.
    pub led: PatternId,
}

impl Default for ModeContext {
    fn default() -> Self {
        Self {
            ticks_in_mode: 0,
            total_ticks: 0,
            motion: MotionStatus::Idle,
            tracking: false,
            parked: false,
            parking: false,
            fault_flags: 0,
            led: PatternId::Off,
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

pub type ModeActionFn = fn(&mut ModeContext);

/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type ModeUpdateFn = fn(&mut ModeContext) -> Option<MountMode>;

/// Static descriptor for a single mode.
pub struct ModeDescriptor {
    pub id: MountMode,
    pub name: &'static str,
    pub on_enter: Option<ModeActionFn>,
    pub on_exit: Option<ModeActionFn>,
    pub on_update: ModeUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct ModeFsm {
    /// Fixed-size table indexed by `MountMode as usize`.
    table: [ModeDescriptor; MountMode::COUNT],
    current: usize,
    tick_count: u64,
    mode_entry_tick: u64,
}

impl ModeFsm {
    pub fn new(table: [ModeDescriptor; MountMode::COUNT], initial: MountMode) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            mode_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first `tick()`.
    pub fn start(&mut self, ctx: &mut ModeContext) {
        info!("mode: starting in {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.
    pub fn tick(&mut self, ctx: &mut ModeContext) {
        self.tick_count += 1;
        ctx.ticks_in_mode = self.tick_count - self.mode_entry_tick;
        ctx.total_ticks = self.tick_count;

        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    /// Jump to `next` regardless of what `on_update` would return
    /// (used when restoring a persisted park).
    pub fn force_transition(&mut self, next: MountMode, ctx: &mut ModeContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_mode(&self) -> MountMode {
        MountMode::from_index(self.current)
    }

    pub fn ticks_in_current_mode(&self) -> u64 {
        self.tick_count - self.mode_entry_tick
    }

    fn transition(&mut self, next: MountMode, ctx: &mut ModeContext) {
        let next_idx = next as usize;
        info!(
            "mode: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }
        self.current = next_idx;
        self.mode_entry_tick = self.tick_count;
        ctx.ticks_in_mode = 0;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
