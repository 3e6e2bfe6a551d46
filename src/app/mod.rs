//! Application core — the command bridge, zero I/O.
//!
//! Everything between the transport and the mount controller lives
//! here: session handling, admission, response routing and the cycle
//! orchestrator.  Hardware is reached only through [`crate::hal`]
//! capabilities and the [`ports::EventSink`] debug port, keeping this
//! layer fully testable on the host.

pub mod arbiter;
pub mod dispatcher;
pub mod events;
pub mod ports;
pub mod response;
pub mod service;
pub mod session;
