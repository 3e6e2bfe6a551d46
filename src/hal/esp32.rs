//! ESP32-S3 board.
//!
//! | Capability         | Backed by                                      |
//! |--------------------|------------------------------------------------|
//! | `DigitalIo`        | [`PinBank`] over `esp-idf-hal` `PinDriver`s     |
//! | `Timer`            | `esp_timer` via `EspTaskTimerService`          |
//! | `NonVolatileStore` | [`NvsStore`] (NVS blob API)                    |
//! | `Transport`        | [`ChannelTransport`] fed by the socket I/O task |
//! | `Motion`           | [`KinematicAxes`]                              |
//!
//! Everything that can fail is acquired in [`Esp32Board::new`], so
//! [`Board::into_parts`] only moves owned parts out.

use core::time::Duration;

use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
use log::{info, warn};

use super::{Board, BoardParts, CapabilitySet, LogicalPin, PartsOf, Timer, TimerCallback, TimerId};
use crate::adapters::channel_transport::ChannelTransport;
use crate::adapters::channels::IO_CHANNELS;
use crate::adapters::gpio::PinBank;
use crate::adapters::nvs::NvsStore;
use crate::drivers::axes::KinematicAxes;
use crate::error::BridgeError;
use crate::pins::{self, gpio_for};

pub type OutPin = PinDriver<'static, AnyOutputPin, Output>;
pub type InPin = PinDriver<'static, AnyInputPin, Input>;

fn output(gpio: i32) -> Result<OutPin, BridgeError> {
    // SAFETY: every GPIO number in the pinmap is claimed exactly once,
    // here, and nothing else in the firmware takes these peripherals.
    let pin = unsafe { AnyOutputPin::new(gpio) };
    PinDriver::output(pin).map_err(|e| {
        warn!("GPIO{}: output config failed: {}", gpio, e);
        BridgeError::Platform("gpio output config failed")
    })
}

fn input(gpio: i32) -> Result<InPin, BridgeError> {
    // SAFETY: see `output`.
    let pin = unsafe { AnyInputPin::new(gpio) };
    let mut driver = PinDriver::input(pin).map_err(|e| {
        warn!("GPIO{}: input config failed: {}", gpio, e);
        BridgeError::Platform("gpio input config failed")
    })?;
    driver
        .set_pull(Pull::Down)
        .map_err(|_| BridgeError::Platform("gpio pull config failed"))?;
    Ok(driver)
}

// ───────────────────────────────────────────────────────────────
// Timer
// ───────────────────────────────────────────────────────────────

/// Periodic timers on the `esp_timer` task.
pub struct EspTimers {
    service: EspTaskTimerService,
    timers: Vec<Option<EspTimer<'static>>>,
}

impl EspTimers {
    fn new() -> Result<Self, BridgeError> {
        let service = EspTaskTimerService::new()
            .map_err(|_| BridgeError::Platform("esp_timer service unavailable"))?;
        Ok(Self {
            service,
            timers: Vec::new(),
        })
    }
}

impl Timer for EspTimers {
    fn start_periodic_timer(
        &mut self,
        interval: Duration,
        callback: TimerCallback,
    ) -> Result<TimerId, BridgeError> {
        if interval.is_zero() {
            return Err(BridgeError::Platform("zero timer interval"));
        }
        let id = TimerId::try_from(self.timers.len())
            .map_err(|_| BridgeError::Platform("timer table full"))?;
        let timer = self
            .service
            .timer(callback)
            .map_err(|_| BridgeError::Platform("esp_timer create failed"))?;
        timer
            .every(interval)
            .map_err(|_| BridgeError::Platform("esp_timer start failed"))?;
        info!("Timer {}: every {}ms", id, interval.as_millis());
        self.timers.push(Some(timer));
        Ok(id)
    }

    fn cancel(&mut self, id: TimerId) {
        // Dropping an EspTimer stops and deletes it.
        if let Some(slot) = self.timers.get_mut(id as usize) {
            *slot = None;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Board
// ───────────────────────────────────────────────────────────────

pub struct Esp32Board {
    pins: PinBank<OutPin, InPin>,
    timers: EspTimers,
    store: NvsStore,
    slew_rate: u32,
}

impl Esp32Board {
    /// Claim the pins, the timer service and NVS.  `slew_rate` seeds the
    /// motion model until the bridge applies its configuration.
    pub fn new(store: NvsStore, slew_rate: u32) -> Result<Self, BridgeError> {
        let pins = PinBank::new(
            output(gpio_for(LogicalPin::StatusLed))?,
            output(gpio_for(LogicalPin::Axis1Enable))?,
            output(gpio_for(LogicalPin::Axis2Enable))?,
            input(gpio_for(LogicalPin::LimitSense))?,
            pins::AXIS_ENABLE_ACTIVE_LOW,
        );
        Ok(Self {
            pins,
            timers: EspTimers::new()?,
            store,
            slew_rate,
        })
    }
}

impl Board for Esp32Board {
    type Io = PinBank<OutPin, InPin>;
    type Timer = EspTimers;
    type Store = NvsStore;
    type Transport = ChannelTransport;
    type Motion = KinematicAxes;

    fn name(&self) -> &'static str {
        "esp32s3"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    fn into_parts(self) -> PartsOf<Self> {
        BoardParts {
            io: self.pins,
            timer: self.timers,
            store: self.store,
            transport: ChannelTransport::new(&IO_CHANNELS),
            motion: KinematicAxes::new(self.slew_rate),
        }
    }
}
