//! Limit supervisor.
//!
//! Runs **every tick right after the motion primitive is serviced** and
//! accumulates a fault bitmask in `MountState.fault_flags`.  The control
//! loop stops motion when a bit is newly set and refuses motion commands
//! that would make a latched fault worse.
//!
//! ## Fault lifecycle
//!
//! 1. A condition triggers a fault (e.g. the limit switch closes).
//! 2. The supervisor sets the corresponding bit.
//! 3. The control loop stops the axes and fails an executing motion
//!    command with `MechanicalConflict`.
//! 4. Each tick the supervisor re-evaluates.  When the condition clears
//!    the bit is unset.
//!
//! Several faults may be active at once; motion that is blocked stays
//! blocked until *every* blocking fault is resolved.

use log::{error, info};

use crate::config::{ARCSEC_PER_DEG, BridgeConfig};
use crate::error::LimitFault;
use crate::hal::{AxisPair, MotionStatus};

pub struct LimitSupervisor {
    axis2_min: i64,
    axis2_max: i64,
    /// Latched fault bitmask.
    faults: u8,
}

impl LimitSupervisor {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            axis2_min: i64::from(config.axis2_min_deg) * ARCSEC_PER_DEG,
            axis2_max: i64::from(config.axis2_max_deg) * ARCSEC_PER_DEG,
            faults: 0,
        }
    }

    /// Evaluate every limit against the latest position, the limit switch
    /// level and the drive status.  Returns the updated fault bitmask.
    pub fn evaluate(&mut self, position: AxisPair, limit_switch: bool, motion: MotionStatus) -> u8 {
        // ── Declination range ─────────────────────────────────────
        self.eval_fault(
            LimitFault::Axis2Range,
            !(self.axis2_min..=self.axis2_max).contains(&position.axis2),
        );

        // ── Hardware limit switch ─────────────────────────────────
        self.eval_fault(LimitFault::LimitSwitch, limit_switch);

        // ── Motor driver ──────────────────────────────────────────
        self.eval_fault(LimitFault::DriverFault, motion == MotionStatus::Fault);

        self.faults
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// True if **any** fault is active.
    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    pub fn has_fault(&self, fault: LimitFault) -> bool {
        self.faults & fault.mask() != 0
    }

    /// Whether axis 2 sits below the lower limit (as opposed to above the
    /// upper one).  Only meaningful while `Axis2Range` is set.
    pub fn below_axis2_min(&self, position: AxisPair) -> bool {
        position.axis2 < self.axis2_min
    }

    // ── Internal ──────────────────────────────────────────────────

    fn eval_fault(&mut self, fault: LimitFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("LIMIT FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("LIMIT FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> LimitSupervisor {
        LimitSupervisor::new(&BridgeConfig::default())
    }

    #[test]
    fn in_range_is_clean() {
        let mut s = supervisor();
        assert_eq!(s.evaluate(AxisPair::new(0, 0), false, MotionStatus::Idle), 0);
        assert!(!s.has_faults());
    }

    #[test]
    fn below_axis2_min_sets_range_fault() {
        let mut s = supervisor();
        let pos = AxisPair::new(0, -86 * 3600);
        s.evaluate(pos, false, MotionStatus::Moving);
        assert!(s.has_fault(LimitFault::Axis2Range));
        assert!(s.below_axis2_min(pos));
    }

    #[test]
    fn faults_accumulate_and_clear_independently() {
        let mut s = supervisor();
        let flags = s.evaluate(AxisPair::default(), true, MotionStatus::Fault);
        assert_eq!(
            flags,
            LimitFault::LimitSwitch.mask() | LimitFault::DriverFault.mask()
        );
        let flags = s.evaluate(AxisPair::default(), false, MotionStatus::Fault);
        assert_eq!(flags, LimitFault::DriverFault.mask());
        assert_eq!(s.evaluate(AxisPair::default(), false, MotionStatus::Idle), 0);
    }
}
