//! Bridge service — the hexagonal core.
//!
//! [`Bridge`] owns the session manager, parser, arbiter and mount
//! controller, and runs one scheduling cycle at a time.  All hardware
//! flows through HAL capabilities injected at call sites, so the whole
//! bridge runs against the simulation board in tests.
//!
//! ```text
//!  Transport ──▶ ┌──────────────────────────────────────────┐ ──▶ EventSink
//!                │                 Bridge                   │
//!  Motion    ◀──▶│ Sessions · Parser · Arbiter · Controller │
//!  DigitalIo ◀── └──────────────────────────────────────────┘
//! ```
//!
//! One cycle is `poll_transport → control_tick → dispatch_responses →
//! reap_idle`.  Stages can also be called one by one when the control
//! tick runs on its own period.

use log::{info, warn};

use super::arbiter::Arbiter;
use super::dispatcher::dispatch;
use super::ports::EventSink;
use super::response::ResponseQueue;
use super::session::SessionManager;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::hal::{DigitalIo, Motion, NonVolatileStore, Transport};
use crate::mount::controller::MountController;
use crate::mount::state::MountState;
use crate::protocol::parser::{CommandParser, ParseOutcome};

pub struct Bridge<T: Transport> {
    config: BridgeConfig,
    sessions: SessionManager<T>,
    parser: CommandParser,
    arbiter: Arbiter,
    controller: MountController,
    responses: ResponseQueue,
    cycles: u64,
}

impl<T: Transport> Bridge<T> {
    /// Construct the bridge around `transport`.
    ///
    /// Does **not** start the mount — call [`start`](Self::start) next.
    pub fn new(config: BridgeConfig, transport: T) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            sessions: SessionManager::new(transport, &config),
            parser: CommandParser::new(),
            arbiter: Arbiter::new(config.queue_depth),
            controller: MountController::new(&config),
            responses: ResponseQueue::new(),
            cycles: 0,
            config,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Restore persisted park state and start the mount-mode FSM.
    pub fn start(
        &mut self,
        motion: &mut impl Motion,
        store: &impl NonVolatileStore,
        sink: &mut impl EventSink,
    ) {
        self.controller.start(motion, store, sink);
        info!(
            "bridge: started (queue {}, {} sessions max)",
            self.config.queue_depth, self.config.max_sessions
        );
    }

    // ── Cycle stages ──────────────────────────────────────────

    /// Drain the transport and admit what it parsed to the arbiter as
    /// one ordered batch.  Rejections are answered in their place among
    /// the session's replies.
    pub fn poll_transport(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        let mut batch: Vec<ParseOutcome> = Vec::new();
        self.sessions
            .poll_transport(now_ms, &mut self.parser, &mut batch, sink);
        if !batch.is_empty() {
            self.arbiter.submit_batch(batch);
        }
    }

    /// Run one mount control tick.
    pub fn control_tick(
        &mut self,
        now_ms: u64,
        motion: &mut impl Motion,
        io: &mut impl DigitalIo,
        sink: &mut impl EventSink,
    ) {
        self.controller.tick(
            now_ms,
            &mut self.arbiter,
            motion,
            io,
            &mut self.responses,
            sink,
        );
    }

    /// Route every pending response and push queued bytes to the wire.
    pub fn dispatch_responses(&mut self, sink: &mut impl EventSink) -> usize {
        let n = dispatch(&mut self.responses, &mut self.sessions, sink);
        self.sessions.flush_all(sink);
        n
    }

    /// Close idle sessions.
    pub fn reap_idle(&mut self, now_ms: u64, sink: &mut impl EventSink) {
        self.sessions.reap_idle(now_ms, sink);
    }

    /// One full scheduling cycle.
    pub fn run_cycle(
        &mut self,
        now_ms: u64,
        motion: &mut impl Motion,
        io: &mut impl DigitalIo,
        sink: &mut impl EventSink,
    ) {
        self.cycles += 1;
        self.poll_transport(now_ms, sink);
        self.control_tick(now_ms, motion, io, sink);
        self.dispatch_responses(sink);
        self.reap_idle(now_ms, sink);
    }

    /// Persist park state if it changed (retries on failure).
    pub fn persist_if_needed(&mut self, store: &mut impl NonVolatileStore, now_ms: u64) -> bool {
        self.controller.persist_if_needed(store, now_ms)
    }

    /// Drop every session and stop the mount, e.g. before a restart.
    pub fn shutdown(&mut self, motion: &mut impl Motion, sink: &mut impl EventSink) {
        motion.stop();
        let ids: Vec<_> = self.sessions.ids().collect();
        for id in ids {
            self.sessions
                .close(id, super::events::CloseReason::Disconnected, sink);
        }
        warn!("bridge: shut down after {} cycles", self.cycles);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Copy of the live mount state.
    pub fn snapshot(&self) -> MountState {
        self.controller.snapshot()
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn sessions(&self) -> &SessionManager<T> {
        &self.sessions
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Responses produced but not yet dispatched.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Scheduling cycles run since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}
