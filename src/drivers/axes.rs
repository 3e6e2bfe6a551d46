//! Kinematic two-axis drive.
//!
//! Stands in for the stepper layer below the [`Motion`] capability: it
//! integrates axis positions at a fixed rate every time it is serviced.
//! Gotos move both axes independently at the slew rate and finish when
//! both reach the target.  Axis 1 takes the short way round the circle.
//! Axis 2 is clamped to ±90°.
//!
//! The same driver backs the simulation board and the ESP32 board; on the
//! ESP32 the enable lines are driven separately through `DigitalIo`.

use log::{debug, warn};

use crate::error::MotionError;
use crate::hal::{AXIS1_TURN_ARCSEC, AxisPair, Direction, Motion, MotionStatus};

const AXIS2_MAX_ARCSEC: i64 = 90 * 3600;

#[derive(Debug, Clone, Copy)]
enum Activity {
    Idle,
    Goto(AxisPair),
    Move { dir: Direction, rate: u32 },
}

pub struct KinematicAxes {
    position: AxisPair,
    activity: Activity,
    slew_rate: u32,
    tracking: bool,
    /// Sub-arcsecond remainder carried between service calls.
    carry_millis: i64,
    fault: bool,
    stalled: bool,
}

impl KinematicAxes {
    pub fn new(slew_rate_arcsec_per_sec: u32) -> Self {
        Self {
            position: AxisPair::default(),
            activity: Activity::Idle,
            slew_rate: slew_rate_arcsec_per_sec.max(1),
            tracking: false,
            carry_millis: 0,
            fault: false,
            stalled: false,
        }
    }

    /// Latch a driver fault.  Motion stops and new motion is refused.
    pub fn latch_fault(&mut self) {
        warn!("axes: driver fault latched");
        self.fault = true;
        self.activity = Activity::Idle;
    }

    pub fn clear_fault(&mut self) {
        self.fault = false;
    }

    /// A stalled drive keeps its activity but makes no progress.
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn step_toward(from: i64, to: i64, step: i64) -> i64 {
        if (to - from).abs() <= step {
            to
        } else if to > from {
            from + step
        } else {
            from - step
        }
    }

    /// Shortest signed distance on the axis-1 circle.
    fn axis1_delta(from: i64, to: i64) -> i64 {
        let mut d = (to - from).rem_euclid(AXIS1_TURN_ARCSEC);
        if d > AXIS1_TURN_ARCSEC / 2 {
            d -= AXIS1_TURN_ARCSEC;
        }
        d
    }

    fn wrap_axis1(value: i64) -> i64 {
        value.rem_euclid(AXIS1_TURN_ARCSEC)
    }

    /// Whole arcseconds covered at `rate` over `elapsed_ms`, carrying the
    /// remainder so slow rates still make progress.
    fn advance(&mut self, rate: u32, elapsed_ms: u32) -> i64 {
        let millis = i64::from(rate) * i64::from(elapsed_ms) + self.carry_millis;
        self.carry_millis = millis % 1000;
        millis / 1000
    }
}

impl Motion for KinematicAxes {
    fn goto(&mut self, target: AxisPair) -> Result<(), MotionError> {
        if self.fault {
            return Err(MotionError::Faulted);
        }
        let target = AxisPair::new(
            Self::wrap_axis1(target.axis1),
            target.axis2.clamp(-AXIS2_MAX_ARCSEC, AXIS2_MAX_ARCSEC),
        );
        debug!("axes: goto {:?} from {:?}", target, self.position);
        self.carry_millis = 0;
        self.activity = Activity::Goto(target);
        Ok(())
    }

    fn start_move(&mut self, dir: Direction, rate_arcsec_per_sec: u32) -> Result<(), MotionError> {
        if self.fault {
            return Err(MotionError::Faulted);
        }
        debug!("axes: move {:?} at {}\"/s", dir, rate_arcsec_per_sec);
        self.carry_millis = 0;
        self.activity = Activity::Move {
            dir,
            rate: rate_arcsec_per_sec.max(1),
        };
        Ok(())
    }

    fn stop(&mut self) {
        self.activity = Activity::Idle;
        self.carry_millis = 0;
    }

    fn set_tracking(&mut self, enabled: bool) {
        self.tracking = enabled;
    }

    fn set_slew_rate(&mut self, arcsec_per_sec: u32) {
        self.slew_rate = arcsec_per_sec.max(1);
    }

    fn set_position(&mut self, position: AxisPair) {
        self.position = AxisPair::new(
            Self::wrap_axis1(position.axis1),
            position.axis2.clamp(-AXIS2_MAX_ARCSEC, AXIS2_MAX_ARCSEC),
        );
    }

    fn service(&mut self, elapsed_ms: u32) -> MotionStatus {
        if self.fault || self.stalled {
            return self.status();
        }
        match self.activity {
            Activity::Idle => {}
            Activity::Goto(target) => {
                let step = self.advance(self.slew_rate, elapsed_ms);
                let d1 = Self::axis1_delta(self.position.axis1, target.axis1);
                let moved1 = Self::step_toward(0, d1, step);
                self.position.axis1 = Self::wrap_axis1(self.position.axis1 + moved1);
                self.position.axis2 = Self::step_toward(self.position.axis2, target.axis2, step);
                if self.position == target {
                    debug!("axes: goto complete at {:?}", target);
                    self.activity = Activity::Idle;
                }
            }
            Activity::Move { dir, rate } => {
                let step = self.advance(rate, elapsed_ms);
                match dir {
                    Direction::North => {
                        self.position.axis2 = (self.position.axis2 + step).min(AXIS2_MAX_ARCSEC);
                    }
                    Direction::South => {
                        self.position.axis2 = (self.position.axis2 - step).max(-AXIS2_MAX_ARCSEC);
                    }
                    Direction::East => {
                        self.position.axis1 = Self::wrap_axis1(self.position.axis1 + step);
                    }
                    Direction::West => {
                        self.position.axis1 = Self::wrap_axis1(self.position.axis1 - step);
                    }
                }
            }
        }
        self.status()
    }

    fn status(&self) -> MotionStatus {
        if self.fault {
            return MotionStatus::Fault;
        }
        match self.activity {
            Activity::Idle => MotionStatus::Idle,
            Activity::Goto(_) => MotionStatus::Slewing,
            Activity::Move { .. } => MotionStatus::Moving,
        }
    }

    fn position(&self) -> AxisPair {
        self.position
    }
}
