//! Response dispatcher.
//!
//! Drains the response queue once per cycle, reports each event to the
//! debug sink, encodes it and hands it to the session manager.  It never
//! waits on a client: slow sessions absorb their own backlog in their
//! outbound queue.

use log::debug;

use super::events::BridgeEvent;
use super::ports::EventSink;
use super::response::{ResponseEvent, ResponseQueue, Target};
use super::session::{Delivery, SessionManager};
use crate::error::Status;
use crate::hal::Transport;
use crate::protocol::SessionId;

/// Route every queued response.  Returns how many were consumed.
pub fn dispatch<T: Transport>(
    responses: &mut ResponseQueue,
    sessions: &mut SessionManager<T>,
    sink: &mut impl EventSink,
) -> usize {
    let mut consumed = 0;
    while let Some(event) = responses.pop_front() {
        consumed += 1;
        report(&event, sink);
        match event.target {
            Target::Session(id) => {
                if let Some(request_id) = event.request_id {
                    if event.status.is_terminal() {
                        sessions.settle(id, request_id);
                    }
                }
                let Some(bytes) = event.encode() else {
                    if sessions.get(id).is_none() {
                        discard(&event, id, sink);
                    }
                    continue;
                };
                match sessions.send_to(id, bytes) {
                    Delivery::Queued => {}
                    Delivery::QueuedDroppedOldest => {
                        sink.emit(&BridgeEvent::ResponseDropped { session: id });
                    }
                    Delivery::NoSession => discard(&event, id, sink),
                }
            }
            Target::Broadcast => {
                if let Some(bytes) = event.encode() {
                    for id in sessions.broadcast(&bytes) {
                        sink.emit(&BridgeEvent::ResponseDropped { session: id });
                    }
                }
            }
        }
    }
    consumed
}

fn discard(event: &ResponseEvent, session: SessionId, sink: &mut impl EventSink) {
    debug!(
        "dispatch: session {} gone, discarding {} response",
        session, event.status
    );
    sink.emit(&BridgeEvent::ResponseDiscarded {
        session,
        request_id: event.request_id,
    });
}

/// Tell the debug collaborator about a command state transition.
fn report(event: &ResponseEvent, sink: &mut impl EventSink) {
    let (Target::Session(session), Some(request_id)) = (event.target, event.request_id) else {
        return;
    };
    match event.status {
        Status::Accepted | Status::Executing => {}
        status if status.is_error() => sink.emit(&BridgeEvent::CommandRejected {
            request_id,
            session,
            status,
        }),
        status => sink.emit(&BridgeEvent::CommandCompleted {
            request_id,
            session,
            status,
        }),
    }
}
