//! SmartWebServer command bridge library.
//!
//! LX200 clients on TCP talk to a telescope mount through this crate:
//! bytes are framed and parsed in [`protocol`], admitted and routed in
//! [`app`], executed against the motion primitive in [`mount`], and every
//! platform dependency sits behind a [`hal`] capability.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module, so the whole bridge runs on the host for tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod hal;
pub mod mount;
pub mod pins;
pub mod protocol;
