//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured bridge events to the
//! `log` facade (the ESP-IDF logger on the device, so UART / USB-CDC).
//! Per-command chatter goes out at `debug`; session and mode changes at
//! `info`; faults and drops at `warn`.

use log::{debug, info, warn};

use crate::app::events::BridgeEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`BridgeEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &BridgeEvent) {
        match event {
            BridgeEvent::Started(mode) => {
                info!("START | initial_mode={}", mode.name());
            }
            BridgeEvent::SessionOpened { session, conn } => {
                info!("SESSION | #{} opened on conn {}", session, conn);
            }
            BridgeEvent::SessionClosed { session, reason } => {
                info!("SESSION | #{} closed ({:?})", session, reason);
            }
            BridgeEvent::ConnectionRefused(conn) => {
                warn!("SESSION | conn {} refused, session limit reached", conn);
            }
            BridgeEvent::CommandAccepted {
                request_id,
                session,
                opcode,
            } => {
                debug!("CMD | #{}/{} {} accepted", session, request_id, opcode.mnemonic());
            }
            BridgeEvent::CommandRejected {
                request_id,
                session,
                status,
            } => {
                debug!("CMD | #{}/{} rejected: {}", session, request_id, status);
            }
            BridgeEvent::CommandCompleted {
                request_id,
                session,
                status,
            } => {
                debug!("CMD | #{}/{} {}", session, request_id, status);
            }
            BridgeEvent::ModeChanged { from, to } => {
                info!("MODE | {} -> {}", from.name(), to.name());
            }
            BridgeEvent::LimitFault(flags) => {
                warn!("FAULT | detected, flags=0b{:08b}", flags);
            }
            BridgeEvent::LimitCleared => {
                info!("FAULT | all cleared");
            }
            BridgeEvent::ResponseDropped { session } => {
                warn!("DISPATCH | #{} slow, dropped oldest response", session);
            }
            BridgeEvent::ResponseDiscarded {
                session,
                request_id,
            } => {
                debug!(
                    "DISPATCH | #{} gone, discarded response for {:?}",
                    session, request_id
                );
            }
        }
    }
}
