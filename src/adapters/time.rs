//! Monotonic time adapter.
//!
//! - **`target_os = "espidf"`** — wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic).
//! - **`not(target_os = "espidf")`** — uses `std::time::Instant` for
//!   host-side testing and simulation.
//!
//! [`platform_now`] is a plain `fn` so it can serve as the time provider
//! of the per-session rate limiters.

use core::time::Duration;

/// Time since boot (device) or since first use (host).
#[cfg(target_os = "espidf")]
pub fn platform_now() -> Duration {
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us.max(0) as u64)
}

/// Time since boot (device) or since first use (host).
#[cfg(not(target_os = "espidf"))]
pub fn platform_now() -> Duration {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed()
}

/// Millisecond clock for the scheduling cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }

    /// Milliseconds since boot (monotonic).
    pub fn now_ms(&self) -> u64 {
        platform_now().as_millis() as u64
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        platform_now().as_secs()
    }
}
