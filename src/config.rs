//! Bridge configuration parameters
//!
//! All tunable parameters for the command bridge and mount control loop.
//! Values are persisted in the non-volatile store as postcard bytes and
//! range-checked before they are written and after they are read.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ConfigError};
use crate::hal::NonVolatileStore;
use crate::protocol::FRAME_CAPACITY;

/// Store key for the persisted [`BridgeConfig`].
pub const CONFIG_KEY: &str = "bridge/config";

/// Arcseconds in one degree.
pub const ARCSEC_PER_DEG: i64 = 3600;

/// Core bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    // --- Parser ---
    /// Longest frame body (bytes between `:` and `#`) before `FrameTooLong`.
    pub max_frame_len: usize,

    // --- Arbiter ---
    /// Mutating commands waiting for the slot.
    pub queue_depth: usize,
    /// Executing command is forced to `TimedOut` after this long.
    pub command_watchdog_ms: u32,

    // --- Sessions ---
    /// Sessions with no inbound bytes for this long are closed.
    pub session_idle_timeout_ms: u32,
    /// Concurrent client limit.
    pub max_sessions: usize,
    /// Per-session outbound frames held while the client is slow.
    pub response_queue_depth: usize,
    /// Commands per second per session (0 disables rate limiting).
    pub rate_limit_per_sec: u16,
    /// Consecutive malformed frames before the session is dropped.
    pub max_protocol_violations: u8,
    /// Push unsolicited mode changes to every session.
    pub broadcast_state_changes: bool,

    // --- Control loop ---
    /// Control tick period.
    pub control_tick_ms: u32,
    /// Slew rate at the `RS` (max) selection.
    pub slew_rate_deg_per_sec: f32,
    /// Lowest declination the mount may point at.
    pub axis2_min_deg: i16,
    /// Highest declination the mount may point at.
    pub axis2_max_deg: i16,
    /// Park position, axis 1 (arcseconds).
    pub park_axis1_arcsec: i64,
    /// Park position, axis 2 (arcseconds).
    pub park_axis2_arcsec: i64,

    // --- Network ---
    /// LX200-over-TCP listen port.
    pub tcp_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            // Parser
            max_frame_len: 32,

            // Arbiter
            queue_depth: 8,
            command_watchdog_ms: 120_000, // longest 180° slew at 2°/s plus margin

            // Sessions
            session_idle_timeout_ms: 300_000,
            max_sessions: 4,
            response_queue_depth: 16,
            rate_limit_per_sec: 50,
            max_protocol_violations: 8,
            broadcast_state_changes: false,

            // Control loop
            control_tick_ms: 20, // 50 Hz
            slew_rate_deg_per_sec: 2.0,
            axis2_min_deg: -85,
            axis2_max_deg: 90,
            park_axis1_arcsec: 0,
            park_axis2_arcsec: 90 * ARCSEC_PER_DEG,

            // Network
            tcp_port: 9999,
        }
    }
}

impl BridgeConfig {
    /// Range-check every field.  Invalid values are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=FRAME_CAPACITY).contains(&self.max_frame_len) {
            return Err(ConfigError::ValidationFailed(
                "max_frame_len must be 4-64",
            ));
        }
        if !(1..=64).contains(&self.queue_depth) {
            return Err(ConfigError::ValidationFailed("queue_depth must be 1-64"));
        }
        if !(1_000..=600_000).contains(&self.command_watchdog_ms) {
            return Err(ConfigError::ValidationFailed(
                "command_watchdog_ms must be 1000-600000",
            ));
        }
        if self.session_idle_timeout_ms < 1_000 {
            return Err(ConfigError::ValidationFailed(
                "session_idle_timeout_ms must be >= 1000",
            ));
        }
        if !(1..=16).contains(&self.max_sessions) {
            return Err(ConfigError::ValidationFailed("max_sessions must be 1-16"));
        }
        if !(2..=256).contains(&self.response_queue_depth) {
            return Err(ConfigError::ValidationFailed(
                "response_queue_depth must be 2-256",
            ));
        }
        if self.max_protocol_violations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_protocol_violations must be >= 1",
            ));
        }
        if !(1..=1_000).contains(&self.control_tick_ms) {
            return Err(ConfigError::ValidationFailed(
                "control_tick_ms must be 1-1000",
            ));
        }
        if !(0.1..=10.0).contains(&self.slew_rate_deg_per_sec) {
            return Err(ConfigError::ValidationFailed(
                "slew_rate_deg_per_sec must be 0.1-10.0",
            ));
        }
        if self.axis2_min_deg < -90 || self.axis2_max_deg > 90 {
            return Err(ConfigError::ValidationFailed(
                "axis2 limits must lie within -90..90",
            ));
        }
        if self.axis2_min_deg >= self.axis2_max_deg {
            return Err(ConfigError::ValidationFailed(
                "axis2_min_deg must be < axis2_max_deg",
            ));
        }
        if !self.axis2_contains(self.park_axis2_arcsec) {
            return Err(ConfigError::ValidationFailed(
                "park position must lie within axis2 limits",
            ));
        }
        if !(0..360 * ARCSEC_PER_DEG).contains(&self.park_axis1_arcsec) {
            return Err(ConfigError::ValidationFailed(
                "park_axis1_arcsec must be 0-1295999",
            ));
        }
        Ok(())
    }

    /// Whether an axis-2 position (arcseconds) lies inside the configured limits.
    pub fn axis2_contains(&self, arcsec: i64) -> bool {
        let lo = i64::from(self.axis2_min_deg) * ARCSEC_PER_DEG;
        let hi = i64::from(self.axis2_max_deg) * ARCSEC_PER_DEG;
        (lo..=hi).contains(&arcsec)
    }

    /// Maximum slew rate in arcseconds per second.
    pub fn slew_rate_arcsec_per_sec(&self) -> u32 {
        (self.slew_rate_deg_per_sec * ARCSEC_PER_DEG as f32) as u32
    }
}

/// Load the persisted configuration, falling back to defaults when the
/// store is empty, unreadable, corrupted, or holds out-of-range values.
pub fn load_config(store: &impl NonVolatileStore) -> BridgeConfig {
    match store.load(CONFIG_KEY) {
        Ok(Some(bytes)) => match postcard::from_bytes::<BridgeConfig>(&bytes) {
            Ok(cfg) => match cfg.validate() {
                Ok(()) => {
                    info!("config: loaded from store ({} bytes)", bytes.len());
                    cfg
                }
                Err(e) => {
                    warn!("config: stored config rejected ({}), using defaults", e);
                    BridgeConfig::default()
                }
            },
            Err(_) => {
                warn!("config: stored config corrupted, using defaults");
                BridgeConfig::default()
            }
        },
        Ok(None) => {
            info!("config: no stored config, using defaults");
            BridgeConfig::default()
        }
        Err(e) => {
            warn!("config: store read error ({}), using defaults", e);
            BridgeConfig::default()
        }
    }
}

/// Validate and persist configuration.
pub fn save_config(
    store: &mut impl NonVolatileStore,
    config: &BridgeConfig,
) -> Result<(), BridgeError> {
    config.validate()?;
    let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::Encode)?;
    store.persist(CONFIG_KEY, &bytes)?;
    info!("config: saved ({} bytes)", bytes.len());
    Ok(())
}
