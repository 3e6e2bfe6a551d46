//! Command queue and arbiter.
//!
//! ```text
//!                   ┌──────────── immediate lane ───────────┐
//!   requests ──▶ admit ──▶ FIFO (queue_depth) ──▶ Command Slot ──▶ control loop
//!                   │        ▲ superseded entries         (one at a time)
//!                   └─ Busy ─┘ become verdicts in place
//! ```
//!
//! Mutating commands wait in the FIFO until the control loop promotes
//! them.  Only the control loop releases the slot.
//!
//! Work that needs no slot (read-only commands, stop, rejections) goes to
//! the immediate lane, unless the same session still has entries in the
//! FIFO.  Then it queues behind them, so a session's replies come back in
//! the order its requests were arbitrated.  Such entries do not count
//! against `queue_depth`.  Stop always takes the immediate lane.
//!
//! A poll batch is sorted by arrival time, then session id, then
//! per-session sequence before admission, so the outcome of simultaneous
//! arrivals is reproducible.

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::error::Status;
use crate::protocol::command::{CommandClass, CommandRequest, SupersedeGroup};
use crate::protocol::parser::ParseOutcome;
use crate::protocol::{RequestId, SessionId};

/// Slot-free entries (reads, verdicts) the FIFO holds at most.
pub const MAX_DEFERRED: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// Promoted, not yet driving hardware.
    Accepted,
    /// Driving hardware; waits for completion, failure or the watchdog.
    Executing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub request: CommandRequest,
    pub phase: SlotPhase,
    /// When the command entered the slot.
    pub since_ms: u64,
}

/// A request already decided by admission; only its answer is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub session: SessionId,
    pub request_id: RequestId,
    pub status: Status,
}

/// One unit of work waiting in the FIFO or the immediate lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    Command(CommandRequest),
    Verdict(Verdict),
}

impl Work {
    pub fn session(&self) -> SessionId {
        match self {
            Self::Command(req) => req.session,
            Self::Verdict(v) => v.session,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Command(req) => req.id,
            Self::Verdict(v) => v.request_id,
        }
    }

    /// Whether this entry has to pass through the command slot.
    pub fn needs_slot(&self) -> bool {
        matches!(self, Self::Command(req) if req.opcode.is_mutating())
    }
}

pub struct Arbiter {
    queue: VecDeque<Work>,
    depth: usize,
    slot: Option<SlotEntry>,
    immediate: VecDeque<Work>,
}

fn group_of(req: &CommandRequest) -> Option<SupersedeGroup> {
    match req.class() {
        CommandClass::Supersede(g) => Some(g),
        _ => None,
    }
}

fn supersede_group(work: &Work) -> Option<SupersedeGroup> {
    match work {
        Work::Command(req) => group_of(req),
        Work::Verdict(_) => None,
    }
}

impl Arbiter {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(queue_depth),
            depth: queue_depth,
            slot: None,
            immediate: VecDeque::new(),
        }
    }

    /// Admit one poll batch in arbitration order.
    pub fn submit_batch(&mut self, mut batch: Vec<ParseOutcome>) {
        batch.sort_by_key(ParseOutcome::order_key);
        for outcome in batch {
            match outcome {
                ParseOutcome::Request(req) => self.submit(req),
                ParseOutcome::Reject {
                    request_id,
                    session,
                    status,
                    ..
                } => self.answer(Verdict {
                    session,
                    request_id,
                    status,
                }),
            }
        }
    }

    /// Admit a single request.
    pub fn submit(&mut self, req: CommandRequest) {
        match req.class() {
            CommandClass::ReadOnly => self.defer_or_now(Work::Command(req)),
            CommandClass::Stop => {
                self.flush_group(SupersedeGroup::Motion, Status::Aborted);
                self.immediate.push_back(Work::Command(req));
            }
            CommandClass::Queue => self.enqueue(req),
            CommandClass::Supersede(group) => {
                let slot_busy = self
                    .slot
                    .as_ref()
                    .is_some_and(|s| group_of(&s.request) == Some(group));
                if slot_busy {
                    debug!(
                        "arbiter: {} from session {} busy, slot holds same group",
                        req.opcode.mnemonic(),
                        req.session
                    );
                    self.answer(Verdict {
                        session: req.session,
                        request_id: req.id,
                        status: Status::Busy,
                    });
                    return;
                }
                let queued = self
                    .queue
                    .iter_mut()
                    .find(|q| supersede_group(q) == Some(group));
                if let Some(prev) = queued {
                    info!(
                        "arbiter: session {} supersedes queued request {} (session {})",
                        req.session,
                        prev.request_id(),
                        prev.session()
                    );
                    // The predecessor keeps its place so its session's
                    // replies stay in order; the newcomer joins the tail.
                    *prev = Work::Verdict(Verdict {
                        session: prev.session(),
                        request_id: prev.request_id(),
                        status: Status::Superseded,
                    });
                }
                self.enqueue(req);
            }
        }
    }

    /// Queue an answer for a request admission already decided.
    pub fn answer(&mut self, verdict: Verdict) {
        self.defer_or_now(Work::Verdict(verdict));
    }

    /// Slot-free work goes behind its session's queued entries, if any.
    fn defer_or_now(&mut self, work: Work) {
        let session = work.session();
        if !self.queue.iter().any(|q| q.session() == session) {
            self.immediate.push_back(work);
            return;
        }
        if self.deferred() >= MAX_DEFERRED {
            warn!(
                "arbiter: session {} request {} dropped, {} entries deferred",
                session,
                work.request_id(),
                MAX_DEFERRED
            );
            return;
        }
        self.queue.push_back(work);
    }

    fn enqueue(&mut self, req: CommandRequest) {
        if self.mutating_queued() >= self.depth {
            debug!("arbiter: queue full, {} busy", req.opcode.mnemonic());
            self.answer(Verdict {
                session: req.session,
                request_id: req.id,
                status: Status::Busy,
            });
        } else {
            self.queue.push_back(Work::Command(req));
        }
    }

    /// Turn every queued command of `group` into a `status` verdict.
    fn flush_group(&mut self, group: SupersedeGroup, status: Status) {
        for entry in self.queue.iter_mut() {
            if supersede_group(entry) == Some(group) {
                *entry = Work::Verdict(Verdict {
                    session: entry.session(),
                    request_id: entry.request_id(),
                    status,
                });
            }
        }
    }

    /// Next entry that can be answered without the slot: the immediate
    /// lane first, then the FIFO head if it is not a mutating command.
    pub fn take_ready(&mut self) -> Option<Work> {
        if let Some(work) = self.immediate.pop_front() {
            return Some(work);
        }
        match self.queue.front() {
            Some(head) if !head.needs_slot() => self.queue.pop_front(),
            _ => None,
        }
    }

    /// Move a mutating FIFO head into an empty slot.  Returns the
    /// promoted request.  Drain [`take_ready`](Self::take_ready) first.
    pub fn promote(&mut self, now_ms: u64) -> Option<CommandRequest> {
        if self.slot.is_some() {
            return None;
        }
        let request = match self.queue.front() {
            Some(Work::Command(req)) if req.opcode.is_mutating() => req.clone(),
            _ => return None,
        };
        self.queue.pop_front();
        self.slot = Some(SlotEntry {
            request: request.clone(),
            phase: SlotPhase::Accepted,
            since_ms: now_ms,
        });
        Some(request)
    }

    /// Mark the slot's command as driving hardware.
    pub fn mark_executing(&mut self) {
        if let Some(entry) = self.slot.as_mut() {
            entry.phase = SlotPhase::Executing;
        }
    }

    /// Empty the slot.  Called only by the control loop.
    pub fn release(&mut self) -> Option<SlotEntry> {
        self.slot.take()
    }

    pub fn slot(&self) -> Option<&SlotEntry> {
        self.slot.as_ref()
    }

    /// Commands in the Executing phase (0 or 1).
    pub fn executing_count(&self) -> usize {
        usize::from(
            self.slot
                .as_ref()
                .is_some_and(|s| s.phase == SlotPhase::Executing),
        )
    }

    /// Mutating commands waiting in the FIFO.
    pub fn queued(&self) -> usize {
        self.mutating_queued()
    }

    fn mutating_queued(&self) -> usize {
        self.queue.iter().filter(|w| w.needs_slot()).count()
    }

    fn deferred(&self) -> usize {
        self.queue.len() - self.mutating_queued()
    }

    pub fn immediate_pending(&self) -> usize {
        self.immediate.len()
    }

    /// Everything admitted and not yet handed to the control loop.
    pub fn pending_work(&self) -> usize {
        self.queue.len() + self.immediate.len()
    }
}
