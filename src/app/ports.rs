//! Port traits owned by the application core.
//!
//! ```text
//!   Bridge ──▶ EventSink ──▶ adapter (serial log, telemetry, ...)
//! ```
//!
//! Hardware capabilities are ports too, but they live in [`crate::hal`]
//! because each board supplies them.  The event sink is the one port the
//! core defines for itself: it is handed every [`BridgeEvent`] and must
//! not block.

use super::events::BridgeEvent;

/// Debug collaborator.  Receives structured notifications of everything
/// the bridge does.  Implementations must return promptly.
pub trait EventSink {
    fn emit(&mut self, event: &BridgeEvent);
}

/// Sink that drops everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &BridgeEvent) {}
}

/// Sink that records every event, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<BridgeEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&BridgeEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &BridgeEvent) {
        self.events.push(event.clone());
    }
}
