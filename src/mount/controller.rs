//! Mount control loop — the only writer of [`MountState`].
//!
//! [`MountController::tick`] runs once per control period:
//!
//! ```text
//!  1. service Motion ──▶ refresh position ──▶ LimitSupervisor
//!  2. Command Slot: arrived? faulted? watchdog?
//!  3. ready work: read-only replies, :Q#, admission verdicts
//!  4. promote FIFO head ──▶ validate ──▶ start or fail fast
//!     (3 and 4 alternate so each session's replies keep their order)
//!  5. ModeFsm ──▶ status LED, drive enables, mode broadcast
//! ```
//!
//! Every command state transition pushes a [`ResponseEvent`].  Read-only
//! commands never touch the slot; they see every earlier command of their
//! own session applied.

use log::{debug, info, warn};

use super::fsm::{ModeContext, ModeFsm, MountMode};
use super::limits::LimitSupervisor;
use super::state::{
    MOUNT_TYPE, MountState, PRODUCT_NAME, ParkRecord, SlewRate, TrackingRate, format_dec,
    format_ra,
};
use super::states::build_mode_table;
use crate::app::arbiter::{Arbiter, SlotPhase, Work};
use crate::app::events::BridgeEvent;
use crate::app::ports::EventSink;
use crate::app::response::{ResponseEvent, ResponseQueue};
use crate::config::BridgeConfig;
use crate::drivers::led_patterns::LedPatternEngine;
use crate::error::{LimitFault, Status};
use crate::hal::{
    AxisPair, DigitalIo, Direction, LogicalPin, Motion, MotionStatus, NonVolatileStore,
};
use crate::protocol::command::{CommandRequest, Opcode, Operand};
use crate::protocol::{Payload, payload};

/// Store key for the persisted [`ParkRecord`].
pub const PARK_KEY: &str = "mount/park";

/// Delay before retrying a failed park-state write.
const PARK_RETRY_MS: u64 = 5_000;

/// Faults that forbid starting any motion.
const BLOCKING_FAULTS: u8 = LimitFault::LimitSwitch.mask() | LimitFault::DriverFault.mask();

/// What executing a promoted command did.
enum Outcome {
    /// Finished (or failed) within this tick; the slot is released.
    Done(Status, Payload),
    /// Motion started; the slot stays occupied until arrival.
    Started(Payload),
}

pub struct MountController {
    config: BridgeConfig,
    state: MountState,
    fsm: ModeFsm,
    ctx: ModeContext,
    limits: LimitSupervisor,
    leds: LedPatternEngine,
    /// A park goto is executing.
    parking: bool,
    park_dirty: bool,
    park_retry_after: u64,
    last_tick_ms: Option<u64>,
    led_level: Option<bool>,
    drives_enabled: Option<bool>,
}

impl MountController {
    /// Build the controller.  Call [`start`](Self::start) before the first tick.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            config: config.clone(),
            state: MountState::default(),
            fsm: ModeFsm::new(build_mode_table(), MountMode::Stopped),
            ctx: ModeContext::default(),
            limits: LimitSupervisor::new(config),
            leds: LedPatternEngine::new(),
            parking: false,
            park_dirty: false,
            park_retry_after: 0,
            last_tick_ms: None,
            led_level: None,
            drives_enabled: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Configure the drive, restore a persisted park and start the mode FSM.
    pub fn start(
        &mut self,
        motion: &mut impl Motion,
        store: &impl NonVolatileStore,
        sink: &mut impl EventSink,
    ) {
        motion.set_slew_rate(self.config.slew_rate_arcsec_per_sec());
        motion.set_tracking(false);
        self.fsm.start(&mut self.ctx);
        if self.restore(store, motion) {
            self.fsm.force_transition(MountMode::Parked, &mut self.ctx);
        }
        self.state.position = motion.position();
        self.state.mode = self.fsm.current_mode();
        self.leds.set_mode_pattern(self.ctx.led);
        sink.emit(&BridgeEvent::Started(self.state.mode));
        info!("mount: started in {}", self.state.mode.name());
    }

    fn restore(&mut self, store: &impl NonVolatileStore, motion: &mut impl Motion) -> bool {
        let bytes = match store.load(PARK_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(e) => {
                warn!("mount: park state unreadable ({})", e);
                return false;
            }
        };
        let record = match postcard::from_bytes::<ParkRecord>(&bytes) {
            Ok(record) => record,
            Err(_) => {
                warn!("mount: park state corrupted, ignoring");
                return false;
            }
        };
        if !record.parked {
            return false;
        }
        motion.set_position(record.position);
        self.state.parked = true;
        self.ctx.parked = true;
        info!("mount: restored park at {:?}", record.position);
        true
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control tick.
    pub fn tick(
        &mut self,
        now_ms: u64,
        arbiter: &mut Arbiter,
        motion: &mut impl Motion,
        io: &mut impl DigitalIo,
        responses: &mut ResponseQueue,
        sink: &mut impl EventSink,
    ) {
        let elapsed = match self.last_tick_ms {
            Some(last) => u32::try_from(now_ms.saturating_sub(last)).unwrap_or(u32::MAX),
            None => self.config.control_tick_ms,
        };
        self.last_tick_ms = Some(now_ms);

        // 1. Motion + limits
        let new_faults = self.service_motion(elapsed, motion, io, sink);

        // 2. Command slot
        self.service_slot(now_ms, new_faults, arbiter, motion, responses);

        // 3 + 4. Ready work in arbitration order, promoting as the FIFO
        // head becomes a mutating command
        loop {
            while let Some(work) = arbiter.take_ready() {
                self.answer(work, arbiter, motion, responses);
            }
            let Some(req) = arbiter.promote(now_ms) else {
                break;
            };
            sink.emit(&BridgeEvent::CommandAccepted {
                request_id: req.id,
                session: req.session,
                opcode: req.opcode,
            });
            responses.push_back(ResponseEvent::status(req.session, req.id, Status::Accepted));
            match self.execute(&req, motion) {
                Outcome::Done(status, body) => {
                    arbiter.release();
                    if status == Status::MechanicalConflict {
                        debug!(
                            "mount: {} from session {} refused",
                            req.opcode.mnemonic(),
                            req.session
                        );
                    }
                    responses.push_back(ResponseEvent::reply(req.session, req.id, status, body));
                }
                Outcome::Started(body) => {
                    arbiter.mark_executing();
                    responses.push_back(ResponseEvent::reply(
                        req.session,
                        req.id,
                        Status::Executing,
                        body,
                    ));
                }
            }
        }

        // 5. Mode FSM and outputs
        self.advance_mode(elapsed, motion, io, responses, sink);
    }

    /// Step 1.  Returns the fault bits that were set this tick.
    fn service_motion(
        &mut self,
        elapsed_ms: u32,
        motion: &mut impl Motion,
        io: &mut impl DigitalIo,
        sink: &mut impl EventSink,
    ) -> u8 {
        let status = motion.service(elapsed_ms);
        self.state.position = motion.position();

        let before = self.limits.faults();
        let limit_switch = io.read_pin(LogicalPin::LimitSense);
        let faults = self.limits.evaluate(self.state.position, limit_switch, status);
        self.state.fault_flags = faults;

        let new_faults = faults & !before;
        if new_faults != 0 {
            warn!("mount: limit fault flags=0b{:08b}", faults);
            if matches!(status, MotionStatus::Slewing | MotionStatus::Moving) {
                motion.stop();
            }
            sink.emit(&BridgeEvent::LimitFault(faults));
        } else if before != 0 && faults == 0 {
            info!("mount: all limit faults cleared");
            sink.emit(&BridgeEvent::LimitCleared);
        }
        new_faults
    }

    /// Step 2: resolve the executing command, if any.
    fn service_slot(
        &mut self,
        now_ms: u64,
        new_faults: u8,
        arbiter: &mut Arbiter,
        motion: &mut impl Motion,
        responses: &mut ResponseQueue,
    ) {
        let Some(entry) = arbiter.slot() else {
            return;
        };
        if entry.phase != SlotPhase::Executing {
            return;
        }
        let (session, id, opcode) = (entry.request.session, entry.request.id, entry.request.opcode);
        let age_ms = now_ms.saturating_sub(entry.since_ms);

        let status = motion.status();
        if new_faults != 0 || status == MotionStatus::Fault {
            warn!("mount: {} failed on limit fault", opcode.mnemonic());
            motion.stop();
            self.parking = false;
            arbiter.release();
            responses.push_back(ResponseEvent::status(session, id, Status::MechanicalConflict));
        } else if status == MotionStatus::Idle {
            if opcode == Opcode::Park {
                self.parking = false;
                self.state.parked = true;
                self.state.tracking = false;
                motion.set_tracking(false);
                self.park_dirty = true;
                info!("mount: parked at {:?}", self.state.position);
            } else {
                info!("mount: slew arrived at {:?}", self.state.position);
            }
            arbiter.release();
            responses.push_back(ResponseEvent::status(session, id, Status::Completed));
        } else if age_ms >= u64::from(self.config.command_watchdog_ms) {
            warn!(
                "mount: {} timed out after {} ms",
                opcode.mnemonic(),
                age_ms
            );
            motion.stop();
            self.parking = false;
            arbiter.release();
            responses.push_back(ResponseEvent::status(session, id, Status::TimedOut));
        }
    }

    /// Step 3: answer a read-only command, a stop or an admission verdict.
    fn answer(
        &mut self,
        work: Work,
        arbiter: &mut Arbiter,
        motion: &mut impl Motion,
        responses: &mut ResponseQueue,
    ) {
        let req = match work {
            Work::Command(req) => req,
            Work::Verdict(v) => {
                responses.push_back(ResponseEvent::status(v.session, v.request_id, v.status));
                return;
            }
        };
        if req.opcode == Opcode::Stop {
            motion.stop();
            self.parking = false;
            if let Some(entry) = arbiter.release() {
                info!(
                    "mount: {} aborted by stop from session {}",
                    entry.request.opcode.mnemonic(),
                    req.session
                );
                responses.push_back(ResponseEvent::status(
                    entry.request.session,
                    entry.request.id,
                    Status::Aborted,
                ));
            }
            responses.push_back(ResponseEvent::status(req.session, req.id, Status::Ok));
            return;
        }
        let body = self.read_only(req.opcode);
        responses.push_back(ResponseEvent::reply(req.session, req.id, Status::Ok, body));
    }

    fn read_only(&self, opcode: Opcode) -> Payload {
        let s = &self.state;
        match opcode {
            Opcode::Ack => payload(MOUNT_TYPE),
            Opcode::GetRa => format_ra(s.position.axis1),
            Opcode::GetDec => format_dec(s.position.axis2),
            Opcode::GetTargetRa => format_ra(s.target.axis1),
            Opcode::GetTargetDec => format_dec(s.target.axis2),
            Opcode::GetStatus => s.status_flags(),
            Opcode::DistanceBars => s.distance_bars(),
            Opcode::GetTrackingRate => s.tracking_hz(),
            Opcode::ProductName => terminated(PRODUCT_NAME),
            Opcode::FirmwareVersion => terminated(env!("CARGO_PKG_VERSION")),
            Opcode::StatusReport => s.report(),
            Opcode::StatusJson => s.json(),
            other => {
                debug_assert!(false, "{} is not read-only", other.mnemonic());
                Payload::new()
            }
        }
    }

    /// Step 4: run a freshly promoted mutating command.
    fn execute(&mut self, req: &CommandRequest, motion: &mut impl Motion) -> Outcome {
        use Outcome::{Done, Started};

        let ok = || Done(Status::Completed, payload(b"1"));
        let silent = || Done(Status::Completed, Payload::new());
        let conflict = || Done(Status::MechanicalConflict, Payload::new());

        match (req.opcode, req.operand) {
            (Opcode::SetTargetRa, Operand::Ra(axis1)) => {
                self.state.target.axis1 = axis1;
                ok()
            }
            (Opcode::SetTargetDec, Operand::Dec(axis2)) => {
                self.state.target.axis2 = axis2;
                ok()
            }
            (Opcode::TrackingOn, _) => {
                if self.state.parked {
                    return conflict();
                }
                self.set_tracking(true, motion);
                ok()
            }
            (Opcode::TrackingOff, _) => {
                self.set_tracking(false, motion);
                ok()
            }
            (Opcode::TrackSidereal, _) => {
                self.state.tracking_rate = TrackingRate::Sidereal;
                silent()
            }
            (Opcode::TrackSolar, _) => {
                self.state.tracking_rate = TrackingRate::Solar;
                silent()
            }
            (Opcode::TrackLunar, _) => {
                self.state.tracking_rate = TrackingRate::Lunar;
                silent()
            }
            (Opcode::RateGuide, _) => {
                self.state.slew_rate = SlewRate::Guide;
                silent()
            }
            (Opcode::RateCenter, _) => {
                self.state.slew_rate = SlewRate::Center;
                silent()
            }
            (Opcode::RateFind, _) => {
                self.state.slew_rate = SlewRate::Find;
                silent()
            }
            (Opcode::RateMax, _) => {
                self.state.slew_rate = SlewRate::Max;
                silent()
            }
            (Opcode::Unpark, _) => {
                if self.state.parked {
                    info!("mount: unparked");
                    self.state.parked = false;
                    self.park_dirty = true;
                }
                ok()
            }
            (Opcode::Slew, _) => {
                if self.state.parked
                    || self.in_motion(motion)
                    || self.faults_block()
                    || !self.config.axis2_contains(self.state.target.axis2)
                {
                    return conflict();
                }
                match motion.goto(self.state.target) {
                    Ok(()) => {
                        info!("mount: slewing to {:?}", self.state.target);
                        Started(payload(b"0"))
                    }
                    Err(e) => {
                        warn!("mount: goto refused ({})", e);
                        conflict()
                    }
                }
            }
            (Opcode::Park, _) => {
                if self.state.parked {
                    return ok();
                }
                if self.in_motion(motion) || self.faults_block() {
                    return conflict();
                }
                let park = AxisPair::new(self.config.park_axis1_arcsec, self.config.park_axis2_arcsec);
                match motion.goto(park) {
                    Ok(()) => {
                        self.parking = true;
                        Started(payload(b"1"))
                    }
                    Err(e) => {
                        warn!("mount: park goto refused ({})", e);
                        conflict()
                    }
                }
            }
            (Opcode::MoveNorth, _) => self.start_move(Direction::North, motion),
            (Opcode::MoveSouth, _) => self.start_move(Direction::South, motion),
            (Opcode::MoveEast, _) => self.start_move(Direction::East, motion),
            (Opcode::MoveWest, _) => self.start_move(Direction::West, motion),
            (opcode, operand) => {
                warn!("mount: {} with operand {:?} not executable", opcode.mnemonic(), operand);
                Done(Status::MalformedCommand, Payload::new())
            }
        }
    }

    fn start_move(&mut self, dir: Direction, motion: &mut impl Motion) -> Outcome {
        if self.state.parked
            || motion.status() == MotionStatus::Slewing
            || self.faults_block()
            || self.worsens_range_fault(dir)
        {
            return Outcome::Done(Status::MechanicalConflict, Payload::new());
        }
        let rate = self
            .state
            .slew_rate
            .arcsec_per_sec(self.config.slew_rate_arcsec_per_sec());
        match motion.start_move(dir, rate) {
            Ok(()) => Outcome::Done(Status::Completed, Payload::new()),
            Err(e) => {
                warn!("mount: move refused ({})", e);
                Outcome::Done(Status::MechanicalConflict, Payload::new())
            }
        }
    }

    fn set_tracking(&mut self, enabled: bool, motion: &mut impl Motion) {
        self.state.tracking = enabled;
        motion.set_tracking(enabled);
    }

    fn in_motion(&self, motion: &impl Motion) -> bool {
        matches!(motion.status(), MotionStatus::Slewing | MotionStatus::Moving)
    }

    fn faults_block(&self) -> bool {
        self.state.fault_flags & BLOCKING_FAULTS != 0
    }

    /// Outside the axis-2 range only the move back towards it is allowed.
    fn worsens_range_fault(&self, dir: Direction) -> bool {
        if !self.limits.has_fault(LimitFault::Axis2Range) {
            return false;
        }
        let below = self.limits.below_axis2_min(self.state.position);
        match dir {
            Direction::North => !below,
            Direction::South => below,
            Direction::East | Direction::West => false,
        }
    }

    /// Step 5.
    fn advance_mode(
        &mut self,
        elapsed_ms: u32,
        motion: &impl Motion,
        io: &mut impl DigitalIo,
        responses: &mut ResponseQueue,
        sink: &mut impl EventSink,
    ) {
        self.ctx.motion = motion.status();
        self.ctx.tracking = self.state.tracking;
        self.ctx.parked = self.state.parked;
        self.ctx.parking = self.parking;
        self.ctx.fault_flags = self.state.fault_flags;

        let from = self.fsm.current_mode();
        self.fsm.tick(&mut self.ctx);
        let to = self.fsm.current_mode();
        self.state.mode = to;

        if to != from {
            sink.emit(&BridgeEvent::ModeChanged { from, to });
            if self.config.broadcast_state_changes {
                let mut text = heapless::String::<32>::new();
                let _ = core::fmt::Write::write_fmt(&mut text, format_args!("!MODE:{}#", to.name()));
                responses.push_back(ResponseEvent::broadcast(payload(text.as_bytes())));
            }
        }

        self.leds.set_mode_pattern(self.ctx.led);
        self.leds.set_fault_pattern(self.state.fault_flags != 0);
        let level = self.leds.tick(elapsed_ms);
        if self.led_level != Some(level) {
            io.write_pin(LogicalPin::StatusLed, level);
            self.led_level = Some(level);
        }

        let enable = !self.state.parked;
        if self.drives_enabled != Some(enable) {
            io.write_pin(LogicalPin::Axis1Enable, enable);
            io.write_pin(LogicalPin::Axis2Enable, enable);
            self.drives_enabled = Some(enable);
        }
    }

    // ── Park persistence ──────────────────────────────────────

    /// Write the park state if it changed.  A failed write is retried
    /// after five seconds.  Returns `true` if the state was written.
    pub fn persist_if_needed(&mut self, store: &mut impl NonVolatileStore, now_ms: u64) -> bool {
        if !self.park_dirty || now_ms < self.park_retry_after {
            return false;
        }
        let record = ParkRecord {
            parked: self.state.parked,
            position: self.state.position,
        };
        let result = postcard::to_allocvec(&record)
            .map_err(|_| crate::error::StoreError::Io)
            .and_then(|bytes| store.persist(PARK_KEY, &bytes));
        match result {
            Ok(()) => {
                self.park_dirty = false;
                info!("mount: park state saved (parked={})", record.parked);
                true
            }
            Err(e) => {
                warn!("mount: park state save failed ({}), retrying", e);
                self.park_retry_after = now_ms + PARK_RETRY_MS;
                false
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Copy of the current mount state.
    pub fn snapshot(&self) -> MountState {
        self.state
    }

    pub fn mode(&self) -> MountMode {
        self.state.mode
    }

    pub fn fault_flags(&self) -> u8 {
        self.state.fault_flags
    }

    /// Whether a park-state write is outstanding.
    pub fn is_park_dirty(&self) -> bool {
        self.park_dirty
    }
}

fn terminated(text: &str) -> Payload {
    let mut p = payload(text.as_bytes());
    let _ = p.push(b'#');
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::nvs::NvsStore;
    use crate::app::ports::RecordingSink;
    use crate::drivers::axes::KinematicAxes;
    use crate::hal::sim::SimPins;

    struct Rig {
        ctl: MountController,
        arbiter: Arbiter,
        axes: KinematicAxes,
        pins: SimPins,
        out: ResponseQueue,
        sink: RecordingSink,
        now: u64,
        next_id: u32,
    }

    impl Rig {
        fn new() -> Self {
            let config = BridgeConfig::default();
            let mut rig = Self {
                ctl: MountController::new(&config),
                arbiter: Arbiter::new(config.queue_depth),
                axes: KinematicAxes::new(1), // start() applies the configured rate
                pins: SimPins::new(),
                out: ResponseQueue::new(),
                sink: RecordingSink::new(),
                now: 0,
                next_id: 1,
            };
            rig.ctl.start(&mut rig.axes, &NvsStore::default(), &mut rig.sink);
            rig
        }

        fn submit(&mut self, opcode: Opcode, operand: Operand) -> u32 {
            let id = self.next_id;
            self.next_id += 1;
            let req = CommandRequest {
                id,
                session: 1,
                opcode,
                operand,
                arrival_ms: self.now,
                seq: id,
            };
            self.arbiter.submit(req);
            id
        }

        fn tick(&mut self) {
            self.now += 20;
            self.ctl.tick(
                self.now,
                &mut self.arbiter,
                &mut self.axes,
                &mut self.pins,
                &mut self.out,
                &mut self.sink,
            );
        }

        fn statuses(&self, id: u32) -> Vec<Status> {
            self.out
                .iter()
                .filter(|e| e.request_id == Some(id))
                .map(|e| e.status)
                .collect()
        }

        fn body(&self, id: u32) -> Vec<u8> {
            self.out
                .iter()
                .filter(|e| e.request_id == Some(id))
                .last()
                .map(|e| e.payload.to_vec())
                .unwrap_or_default()
        }
    }

    #[test]
    fn read_only_answers_from_snapshot() {
        let mut rig = Rig::new();
        let id = rig.submit(Opcode::GetDec, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(id), vec![Status::Ok]);
        assert_eq!(rig.body(id), b"+00*00:00#");
        assert!(rig.arbiter.slot().is_none());
    }

    #[test]
    fn slew_executes_then_completes_on_arrival() {
        let mut rig = Rig::new();
        rig.submit(Opcode::SetTargetDec, Operand::Dec(3600));
        let id = rig.submit(Opcode::Slew, Operand::None);
        rig.tick(); // Sd completes, MS starts
        rig.tick(); // 144" of 3600"
        assert_eq!(rig.statuses(id), vec![Status::Accepted, Status::Executing]);
        assert_eq!(rig.arbiter.executing_count(), 1);
        assert_eq!(rig.ctl.mode(), MountMode::Slewing);

        for _ in 0..30 {
            rig.tick();
        }
        assert_eq!(rig.statuses(id).last(), Some(&Status::Completed));
        assert_eq!(rig.arbiter.executing_count(), 0);
        assert_eq!(rig.ctl.snapshot().position.axis2, 3600);
    }

    #[test]
    fn slew_outside_limits_fails_fast() {
        let mut rig = Rig::new();
        rig.submit(Opcode::SetTargetDec, Operand::Dec(-89 * 3600));
        let id = rig.submit(Opcode::Slew, Operand::None);
        rig.tick();
        rig.tick();
        assert_eq!(
            rig.statuses(id),
            vec![Status::Accepted, Status::MechanicalConflict]
        );
        assert!(rig.arbiter.slot().is_none());
        assert_eq!(rig.axes.status(), MotionStatus::Idle);
    }

    #[test]
    fn watchdog_times_out_a_stalled_slew() {
        let mut rig = Rig::new();
        rig.submit(Opcode::SetTargetDec, Operand::Dec(3600));
        let id = rig.submit(Opcode::Slew, Operand::None);
        rig.tick();
        rig.tick();
        rig.axes.set_stalled(true);
        rig.now += u64::from(BridgeConfig::default().command_watchdog_ms);
        rig.tick();
        assert_eq!(rig.statuses(id).last(), Some(&Status::TimedOut));
        assert!(rig.arbiter.slot().is_none());
        assert_eq!(rig.axes.status(), MotionStatus::Idle);
    }

    #[test]
    fn stop_aborts_executing_slew() {
        let mut rig = Rig::new();
        rig.submit(Opcode::SetTargetDec, Operand::Dec(3600));
        let slew = rig.submit(Opcode::Slew, Operand::None);
        rig.tick();
        rig.tick();
        let stop = rig.submit(Opcode::Stop, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(slew).last(), Some(&Status::Aborted));
        assert_eq!(rig.statuses(stop), vec![Status::Ok]);
        assert_eq!(rig.axes.status(), MotionStatus::Idle);
    }

    #[test]
    fn limit_switch_fails_slew_and_stops_motion() {
        let mut rig = Rig::new();
        rig.submit(Opcode::SetTargetDec, Operand::Dec(3600));
        let id = rig.submit(Opcode::Slew, Operand::None);
        rig.tick();
        rig.tick();
        rig.pins.set_input(LogicalPin::LimitSense, true);
        rig.tick();
        assert_eq!(rig.statuses(id).last(), Some(&Status::MechanicalConflict));
        assert_eq!(rig.axes.status(), MotionStatus::Idle);
        assert!(rig.sink.events.iter().any(|e| matches!(e, BridgeEvent::LimitFault(_))));

        let again = rig.submit(Opcode::MoveNorth, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(again).last(), Some(&Status::MechanicalConflict));

        rig.pins.set_input(LogicalPin::LimitSense, false);
        rig.tick();
        assert!(rig.sink.events.contains(&BridgeEvent::LimitCleared));
    }

    #[test]
    fn park_disables_drives_and_unpark_restores() {
        let mut rig = Rig::new();
        rig.axes.set_position(AxisPair::new(0, 90 * 3600 - 5));
        let park = rig.submit(Opcode::Park, Operand::None);
        rig.tick();
        assert_eq!(rig.ctl.mode(), MountMode::Parking);
        for _ in 0..400 {
            rig.tick();
        }
        assert_eq!(rig.statuses(park).last(), Some(&Status::Completed));
        assert_eq!(rig.ctl.mode(), MountMode::Parked);
        assert!(rig.ctl.is_park_dirty());
        assert!(!rig.pins.level(LogicalPin::Axis1Enable));

        let te = rig.submit(Opcode::TrackingOn, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(te).last(), Some(&Status::MechanicalConflict));

        rig.submit(Opcode::Unpark, Operand::None);
        rig.tick();
        rig.tick();
        assert_eq!(rig.ctl.mode(), MountMode::Stopped);
        assert!(rig.pins.level(LogicalPin::Axis2Enable));
    }

    #[test]
    fn park_state_survives_restart() {
        let mut store = NvsStore::default();
        let mut rig = Rig::new();
        rig.axes.set_position(AxisPair::new(0, 90 * 3600));
        rig.submit(Opcode::Park, Operand::None);
        rig.tick();
        rig.tick();
        assert!(rig.ctl.persist_if_needed(&mut store, rig.now));
        assert!(!rig.ctl.persist_if_needed(&mut store, rig.now));

        let mut ctl = MountController::new(&BridgeConfig::default());
        let mut axes = KinematicAxes::new(1);
        let mut sink = RecordingSink::new();
        ctl.start(&mut axes, &store, &mut sink);
        assert_eq!(ctl.mode(), MountMode::Parked);
        assert_eq!(axes.position(), AxisPair::new(0, 90 * 3600));
        assert_eq!(sink.events[0], BridgeEvent::Started(MountMode::Parked));
    }

    #[test]
    fn failed_park_write_is_retried_later() {
        let mut store = NvsStore::default();
        store.set_read_only(true);
        let mut rig = Rig::new();
        rig.axes.set_position(AxisPair::new(0, 90 * 3600));
        rig.submit(Opcode::Park, Operand::None);
        rig.tick();
        rig.tick();
        assert!(!rig.ctl.persist_if_needed(&mut store, rig.now));
        store.set_read_only(false);
        assert!(!rig.ctl.persist_if_needed(&mut store, rig.now + 1_000));
        assert!(rig.ctl.persist_if_needed(&mut store, rig.now + PARK_RETRY_MS));
    }

    #[test]
    fn move_out_of_range_latches_and_only_recovery_is_allowed() {
        let mut rig = Rig::new();
        rig.axes.set_position(AxisPair::new(0, -85 * 3600 + 1));
        rig.submit(Opcode::RateMax, Operand::None);
        rig.submit(Opcode::MoveSouth, Operand::None);
        rig.tick();
        rig.tick();
        rig.tick();
        assert_ne!(rig.ctl.fault_flags() & LimitFault::Axis2Range.mask(), 0);
        assert_eq!(rig.axes.status(), MotionStatus::Idle);

        let south = rig.submit(Opcode::MoveSouth, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(south).last(), Some(&Status::MechanicalConflict));
        let north = rig.submit(Opcode::MoveNorth, Operand::None);
        rig.tick();
        assert_eq!(rig.statuses(north).last(), Some(&Status::Completed));
    }

    #[test]
    fn mode_changes_are_broadcast_when_enabled() {
        let config = BridgeConfig {
            broadcast_state_changes: true,
            ..Default::default()
        };
        let mut rig = Rig::new();
        rig.ctl = MountController::new(&config);
        rig.ctl.start(&mut rig.axes, &NvsStore::default(), &mut rig.sink);
        rig.submit(Opcode::TrackingOn, Operand::None);
        rig.tick();
        assert!(rig
            .out
            .iter()
            .any(|e| e.request_id.is_none() && &e.payload[..] == b"!MODE:Tracking#"));
    }

    #[test]
    fn version_reply_is_terminated() {
        let mut rig = Rig::new();
        let id = rig.submit(Opcode::FirmwareVersion, Operand::None);
        rig.tick();
        let mut expected = env!("CARGO_PKG_VERSION").as_bytes().to_vec();
        expected.push(b'#');
        assert_eq!(rig.body(id), expected);
    }
}
