//! Status LED pattern engine with priority-based pattern selection.
//!
//! Generates the on/off level for the single status LED.  The control
//! loop calls `tick()` each control cycle and writes the result to
//! `LogicalPin::StatusLed`.
//!
//! ## Priority hierarchy (highest first)
//!
//! 1. **Fault** — rapid flash (8 Hz) while any limit fault is latched
//! 2. **Mount mode** — one pattern per FSM mode
//!
//! ## Pattern types
//!
//! | Pattern      | Description                   | Rate  |
//! |--------------|-------------------------------|-------|
//! | Solid        | Constantly on                 | —     |
//! | SlowBlink    | On/off square wave            | 1 Hz  |
//! | FastBlink    | On/off square wave            | 4 Hz  |
//! | DoubleBlink  | Two quick flashes, then pause | 1 Hz  |
//! | RapidFlash   | Very fast on/off              | 8 Hz  |
//! | Off          | Dark                          | —     |

/// Pattern identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternId {
    Solid,
    SlowBlink,
    FastBlink,
    DoubleBlink,
    RapidFlash,
    Off,
}

/// LED pattern engine.  Stack-allocated, no heap.
pub struct LedPatternEngine {
    phase_ms: u32,
    active: Option<PatternId>,
    mode_request: Option<PatternId>,
    fault_request: bool,
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: None,
            mode_request: None,
            fault_request: false,
        }
    }

    /// Set the mount-mode pattern (priority 2).
    pub fn set_mode_pattern(&mut self, pattern: PatternId) {
        self.mode_request = Some(pattern);
    }

    /// Set or clear the fault pattern (priority 1 — highest).
    pub fn set_fault_pattern(&mut self, active: bool) {
        self.fault_request = active;
    }

    /// Advance the pattern phase and return the LED level.
    /// `delta_ms` is the time since the last call.
    pub fn tick(&mut self, delta_ms: u32) -> bool {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);

        let selected = self.select_active();
        if selected != self.active {
            self.phase_ms = 0;
        }
        self.active = selected;

        match self.active {
            Some(pattern) => self.generate(pattern),
            None => false,
        }
    }

    fn select_active(&self) -> Option<PatternId> {
        if self.fault_request {
            Some(PatternId::RapidFlash)
        } else {
            self.mode_request
        }
    }

    fn generate(&self, pattern: PatternId) -> bool {
        match pattern {
            PatternId::Solid => true,
            PatternId::Off => false,
            PatternId::SlowBlink => (self.phase_ms % 1000) < 500,
            PatternId::FastBlink => (self.phase_ms % 250) < 125,
            PatternId::DoubleBlink => {
                let cycle = self.phase_ms % 1000;
                cycle < 100 || (200..300).contains(&cycle)
            }
            PatternId::RapidFlash => (self.phase_ms % 125) < 63,
        }
    }
}
