//! GPIO adapter — [`DigitalIo`] over `embedded-hal` digital pins.
//!
//! The bank owns one driver per [`LogicalPin`].  On the device these are
//! `esp-idf-hal` `PinDriver`s; any `embedded-hal` 1.0 pin works, which is
//! how the host tests drive it.
//!
//! Pin faults never reach the bridge: a failed read reports LOW and a
//! failed write is logged and dropped.

use embedded_hal::digital::{Error as _, InputPin, OutputPin};
use log::{debug, warn};

use crate::hal::{DigitalIo, LogicalPin};

pub struct PinBank<O, I> {
    status_led: O,
    axis1_enable: O,
    axis2_enable: O,
    limit_sense: I,
    /// Enable outputs are driven inverted.
    enable_active_low: bool,
    /// Last logical level written, indexed by [`LogicalPin::index`].
    written: [bool; LogicalPin::COUNT],
}

impl<O: OutputPin, I: InputPin> PinBank<O, I> {
    /// Take ownership of the pins.  Outputs start LOW (drivers disabled).
    pub fn new(
        status_led: O,
        axis1_enable: O,
        axis2_enable: O,
        limit_sense: I,
        enable_active_low: bool,
    ) -> Self {
        let mut bank = Self {
            status_led,
            axis1_enable,
            axis2_enable,
            limit_sense,
            enable_active_low,
            written: [false; LogicalPin::COUNT],
        };
        for pin in [LogicalPin::StatusLed, LogicalPin::Axis1Enable, LogicalPin::Axis2Enable] {
            bank.write_pin(pin, false);
        }
        bank
    }

    fn output(&mut self, pin: LogicalPin) -> Option<(&mut O, bool)> {
        let invert = self.enable_active_low;
        match pin {
            LogicalPin::StatusLed => Some((&mut self.status_led, false)),
            LogicalPin::Axis1Enable => Some((&mut self.axis1_enable, invert)),
            LogicalPin::Axis2Enable => Some((&mut self.axis2_enable, invert)),
            LogicalPin::LimitSense => None,
        }
    }
}

impl<O: OutputPin, I: InputPin> DigitalIo for PinBank<O, I> {
    fn read_pin(&mut self, pin: LogicalPin) -> bool {
        match pin {
            LogicalPin::LimitSense => self.limit_sense.is_high().unwrap_or_else(|e| {
                warn!("GPIO: read {:?} failed: {:?}", pin, e.kind());
                false
            }),
            // Outputs read back what was last driven.
            _ => self.written[pin.index()],
        }
    }

    fn write_pin(&mut self, pin: LogicalPin, high: bool) {
        let Some((out, invert)) = self.output(pin) else {
            debug!("GPIO: ignoring write to input {:?}", pin);
            return;
        };
        let result = if high != invert {
            out.set_high()
        } else {
            out.set_low()
        };
        match result {
            Ok(()) => self.written[pin.index()] = high,
            Err(e) => warn!("GPIO: write {:?} failed: {:?}", pin, e.kind()),
        }
    }
}
