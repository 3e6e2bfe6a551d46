//! Session admission, framing errors and backpressure through the bridge.

use crate::rig::{Rig, quiet};

use smartwebserver::app::events::{BridgeEvent, CloseReason};
use smartwebserver::config::BridgeConfig;

#[test]
fn oversized_frame_is_rejected_and_session_survives() {
    let mut rig = Rig::new();
    rig.connect(1);
    let mut long = b":".to_vec();
    long.extend_from_slice(&[b'G'; 40]);
    long.push(b'#');
    assert_eq!(rig.exchange(1, &long), "E:FrameTooLong#");
    assert_eq!(rig.exchange(1, b":GR#"), "00:00:00#");
}

#[test]
fn unknown_command_is_malformed() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":ZZ#"), "E:MalformedCommand#");
    assert_eq!(rig.exchange(1, b":Sr25:00:00#"), "E:MalformedCommand#");
}

#[test]
fn split_frame_is_reassembled_across_cycles() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":G"), "");
    assert_eq!(rig.exchange(1, b"D#"), "+00*00:00#");
}

#[test]
fn protocol_violations_flush_errors_then_close() {
    let mut rig = Rig::with_config(BridgeConfig {
        max_protocol_violations: 2,
        ..quiet()
    });
    rig.connect(1);
    assert_eq!(
        rig.exchange(1, b":X#:Y#"),
        "E:MalformedCommand#E:MalformedCommand#"
    );
    assert!(rig.link.was_closed_by_bridge(1));
    assert_eq!(
        rig.events(|e| matches!(
            e,
            BridgeEvent::SessionClosed {
                reason: CloseReason::ProtocolViolation,
                ..
            }
        )),
        1
    );
}

#[test]
fn connections_over_limit_are_refused() {
    let mut rig = Rig::with_config(BridgeConfig {
        max_sessions: 1,
        ..quiet()
    });
    rig.connect(1);
    rig.connect(2);
    assert!(rig.link.was_closed_by_bridge(2));
    assert_eq!(rig.bridge.sessions().len(), 1);
    assert_eq!(rig.events(|e| *e == BridgeEvent::ConnectionRefused(2)), 1);
    assert_eq!(rig.exchange(1, b":GR#"), "00:00:00#");
}

#[test]
fn idle_session_is_reaped() {
    let mut rig = Rig::with_config(BridgeConfig {
        session_idle_timeout_ms: 1_000,
        ..quiet()
    });
    rig.connect(1);
    rig.connect(2);
    for _ in 0..60 {
        rig.link.send(2, b":GR#");
        rig.cycle();
    }
    assert!(rig.link.was_closed_by_bridge(1));
    assert!(!rig.link.was_closed_by_bridge(2));
    assert_eq!(
        rig.events(|e| matches!(
            e,
            BridgeEvent::SessionClosed {
                reason: CloseReason::IdleTimeout,
                ..
            }
        )),
        1
    );
}

#[test]
fn rate_limited_burst_gets_busy() {
    let mut rig = Rig::with_config(BridgeConfig {
        rate_limit_per_sec: 2,
        ..Default::default()
    });
    rig.connect(1);
    let text = rig.exchange(1, b":GR#:GR#:GR#:GR#:GR#:GR#");
    assert!(text.contains("E:Busy#"), "got {text:?}");
}

#[test]
fn full_command_queue_answers_busy() {
    let mut rig = Rig::with_config(BridgeConfig {
        queue_depth: 2,
        ..quiet()
    });
    rig.connect(1);
    rig.connect(2);
    assert_eq!(rig.exchange(1, b":Sd+01*00#:MS#"), "10");
    // Busy waits behind the session's own queued commands.
    assert_eq!(rig.exchange(1, b":Te#:TQ#:TS#"), "");
    assert_eq!(rig.bridge.arbiter().queued(), 2);
    // Another session with nothing queued hears it at once.
    assert_eq!(rig.exchange(2, b":Te#"), "E:Busy#");

    // Queued commands run once the slew releases the slot.
    rig.cycles(30);
    assert_eq!(rig.link.take_text(1), "1E:Busy#");
    assert_eq!(rig.bridge.arbiter().queued(), 0);
    assert!(rig.bridge.snapshot().tracking);
}

#[test]
fn stalled_reader_does_not_hold_up_other_sessions() {
    let mut rig = Rig::with_config(BridgeConfig {
        response_queue_depth: 4,
        ..quiet()
    });
    rig.connect(1);
    rig.connect(2);
    rig.link.set_budget(1, Some(0));
    rig.link.send(1, &b":GXS#".repeat(12));
    rig.link.send(2, b":GR#");
    rig.cycle();

    assert_eq!(rig.link.take_text(2), "00:00:00#");
    let stalled = rig.bridge.sessions().session_for_conn(1).unwrap();
    assert_eq!(rig.bridge.sessions().get(stalled).unwrap().queued_frames(), 4);
    assert!(rig.events(|e| matches!(e, BridgeEvent::ResponseDropped { .. })) >= 8);
    assert_eq!(rig.link.take_text(1), "");
}

#[test]
fn slow_client_reads_whole_report_then_next_reply() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.link.set_budget(1, Some(10));
    rig.link.send(1, b":GXS#:GR#");
    rig.cycle();
    for _ in 0..20 {
        rig.link.set_budget(1, Some(10));
        rig.cycle();
    }
    assert_eq!(
        rig.link.take_text(1),
        "RA 00:00:00\nDEC +00*00:00\nMODE Stopped\nTRACK off\nRATE Sidereal\nSLEW Max\nFAULTS 0x00#00:00:00#"
    );
}
