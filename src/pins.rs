//! GPIO pin assignments for the SmartWebServer ESP32-S3 board.
//!
//! Single source of truth for the board's pinmap.  The rest of the
//! firmware only ever names a [`LogicalPin`]; [`gpio_for`] resolves it
//! here.

use crate::hal::LogicalPin;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status LED, active HIGH.
pub const STATUS_LED_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Mount interface
// ---------------------------------------------------------------------------

/// Limit switch input with internal pull-down.  HIGH = limit reached.
pub const LIMIT_SENSE_GPIO: i32 = 4;

/// Axis 1 (RA) stepper driver enable.
pub const AXIS1_ENABLE_GPIO: i32 = 5;
/// Axis 2 (Dec) stepper driver enable.
pub const AXIS2_ENABLE_GPIO: i32 = 6;

/// TMC/DRV stepper drivers enable on LOW.  Logical HIGH from the bridge
/// means "enabled" and is inverted at the pin.
pub const AXIS_ENABLE_ACTIVE_LOW: bool = true;

/// GPIO number behind `pin`.
pub const fn gpio_for(pin: LogicalPin) -> i32 {
    match pin {
        LogicalPin::StatusLed => STATUS_LED_GPIO,
        LogicalPin::LimitSense => LIMIT_SENSE_GPIO,
        LogicalPin::Axis1Enable => AXIS1_ENABLE_GPIO,
        LogicalPin::Axis2Enable => AXIS2_ENABLE_GPIO,
    }
}
