//! Motion model, status LED patterns and platform task helpers.

pub mod axes;
pub mod led_patterns;
pub mod task_pin;
pub mod watchdog;
