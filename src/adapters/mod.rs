//! Adapters — concrete implementations of the HAL capabilities and the
//! bridge's outward ports.
//!
//! | Adapter             | Implements         | Connects to                   |
//! |---------------------|--------------------|-------------------------------|
//! | `channel_transport` | Transport          | I/O task channels             |
//! | `gpio`              | DigitalIo          | `embedded-hal` digital pins   |
//! | `io_task`           | —                  | socket ⇄ channel pump thread  |
//! | `log_sink`          | EventSink          | Serial log output             |
//! | `nvs`               | NonVolatileStore   | NVS / in-memory store         |
//! | `tcp_server`        | Transport          | `std::net` TCP (lwIP on ESP)  |
//! | `time`              | —                  | ESP32 system timer / Instant  |

pub mod channel_transport;
pub mod channels;
pub mod gpio;
pub mod io_task;
pub mod log_sink;
pub mod nvs;
pub mod tcp_server;
pub mod time;
