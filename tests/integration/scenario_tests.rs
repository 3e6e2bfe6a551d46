//! End-to-end command scenarios against the simulation board.
//!
//! Each test speaks LX200 through the simulated transport and asserts on
//! the exact bytes a client would read.  Default slew is 2°/s at a 20ms
//! tick, so a goto covers 144″ per cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::rig::{Rig, quiet};

use smartwebserver::app::events::BridgeEvent;
use smartwebserver::config::BridgeConfig;
use smartwebserver::hal::{LogicalPin, Motion, MotionStatus, Timer};
use smartwebserver::mount::fsm::MountMode;

const ONE_DEG: i64 = 3600;

// ── Read-only ────────────────────────────────────────────────

#[test]
fn get_ra_answers_in_the_same_cycle() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":GR#"), "00:00:00#");
    assert_eq!(rig.exchange(1, b":GD#"), "+00*00:00#");
}

#[test]
fn repeated_queries_answer_identically() {
    let mut rig = Rig::new();
    rig.connect(1);
    let text = rig.exchange(1, b":GXS#:GXS#");
    let (first, second) = text.split_at(text.len() / 2);
    assert!(first.starts_with("RA ") && first.ends_with('#'));
    assert_eq!(first, second);
    assert_eq!(rig.exchange(1, b":GR#:GR#"), "00:00:00#00:00:00#");
}

// ── Reply order ──────────────────────────────────────────────

#[test]
fn query_after_setter_sees_the_new_target() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":Sr01:00:00#:Gr#"), "101:00:00#");
    assert_eq!(rig.exchange(1, b":Sd+02*00:00#:Gd#"), "1+02*00:00#");
}

#[test]
fn rejection_keeps_its_place_among_replies() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":GR#:XYZ#"), "00:00:00#E:MalformedCommand#");
    assert_eq!(rig.exchange(1, b":XYZ#:GR#"), "E:MalformedCommand#00:00:00#");
}

#[test]
fn queries_wait_for_their_sessions_queued_commands() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);
    assert_eq!(rig.exchange(2, b":Sd+01*00#:MS#"), "10");

    // Te waits for the slot; the query and the error wait behind it.
    assert_eq!(rig.exchange(1, b":Te#:GD#:ZZ#"), "");
    // Session 2 has nothing queued and is answered at once.
    assert_eq!(rig.exchange(2, b":GR#"), "00:00:00#");

    rig.cycles(30);
    assert_eq!(rig.link.take_text(1), "1+01*00:00#E:MalformedCommand#");
}

#[test]
fn ack_byte_reports_mount_type() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, &[0x06]), "G");
}

#[test]
fn product_name_and_version() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":GVP#"), "SmartWebServer#");
    assert_eq!(
        rig.exchange(1, b":GVN#"),
        format!("{}#", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn json_status_is_parseable() {
    let mut rig = Rig::new();
    rig.connect(1);
    let text = rig.exchange(1, b":GXJ#");
    let body = text.strip_suffix('#').expect("json reply is terminated");
    let value: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(value["mode"], "Stopped");
    assert_eq!(value["parked"], false);
    assert_eq!(value["position"]["axis2"], 0);
}

// ── Slew lifecycle ───────────────────────────────────────────

#[test]
fn slew_busy_for_second_client_until_arrival() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);

    // Sd completes with "1"; MS starts with "0".
    assert_eq!(rig.exchange(1, b":Sd+01*00:00#:MS#"), "10");
    assert_eq!(rig.bridge.arbiter().executing_count(), 1);
    assert_eq!(
        rig.events(|e| matches!(e, BridgeEvent::CommandAccepted { .. })),
        2
    );

    assert_eq!(rig.exchange(2, b":MS#"), "E:Busy#");
    rig.cycle();
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Slewing);

    rig.cycles(30);
    assert_eq!(rig.bridge.arbiter().executing_count(), 0);
    assert_eq!(rig.bridge.snapshot().position.axis2, ONE_DEG);
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Stopped);

    // Retry after arrival is admitted.
    assert_eq!(rig.exchange(2, b":MS#"), "0");
    rig.cycles(2);
    assert!(rig.bridge.arbiter().slot().is_none());
}

#[test]
fn slew_below_axis2_limit_is_refused() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(
        rig.exchange(1, b":Sd-89*00#:MS#"),
        "1E:MechanicalConflict#"
    );
    assert_eq!(rig.motion.status(), MotionStatus::Idle);
}

#[test]
fn stop_aborts_executing_slew() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);
    assert_eq!(rig.exchange(1, b":Sd+10*00#:MS#"), "10");
    rig.cycle();

    // The stop itself is silent; the slew's owner sees Aborted.
    assert_eq!(rig.exchange(2, b":Q#"), "");
    assert_eq!(rig.link.take_text(1), "E:Aborted#");
    assert_eq!(rig.motion.status(), MotionStatus::Idle);
    assert!(rig.bridge.snapshot().position.axis2 < 10 * ONE_DEG);
    assert!(rig.bridge.arbiter().slot().is_none());
}

#[test]
fn queued_move_is_superseded_by_later_move() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);

    rig.link.send(1, b":Mn#");
    rig.link.send(2, b":Ms#");
    rig.cycle();

    assert_eq!(rig.link.take_text(1), "E:Superseded#");
    assert_eq!(rig.link.take_text(2), "");
    rig.cycle();
    assert_eq!(rig.motion.status(), MotionStatus::Moving);
    assert!(rig.bridge.snapshot().position.axis2 < 0);

    assert_eq!(rig.exchange(1, b":Q#"), "");
    assert_eq!(rig.motion.status(), MotionStatus::Idle);
}

#[test]
fn superseding_slew_uses_its_own_target() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);

    rig.link.send(1, b":Sd+01*00#:MS#");
    rig.link.send(2, b":Sd+05*00#:MS#");
    rig.cycle();
    assert_eq!(rig.link.take_text(1), "1E:Superseded#");
    assert_eq!(rig.link.take_text(2), "10");

    rig.cycles(150);
    assert_eq!(rig.bridge.arbiter().executing_count(), 0);
    assert_eq!(rig.bridge.snapshot().position.axis2, 5 * ONE_DEG);
    assert_eq!(rig.bridge.snapshot().target.axis2, 5 * ONE_DEG);
}

#[test]
fn stalled_slew_times_out() {
    let mut rig = Rig::with_config(BridgeConfig {
        command_watchdog_ms: 1_000,
        ..quiet()
    });
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":Sd+45*00#:MS#"), "10");
    rig.motion.set_stalled(true);

    rig.cycles(45);
    assert_eq!(rig.link.take_text(1), "");
    rig.cycles(10);
    assert_eq!(rig.link.take_text(1), "E:TimedOut#");
    assert_eq!(rig.motion.status(), MotionStatus::Idle);
}

#[test]
fn limit_switch_fails_slew_and_blocks_motion_until_cleared() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":Sd+10*00#:MS#"), "10");

    rig.io.set_input(LogicalPin::LimitSense, true);
    rig.cycle();
    assert_eq!(rig.link.take_text(1), "E:MechanicalConflict#");
    assert_eq!(rig.motion.status(), MotionStatus::Idle);
    assert_eq!(rig.events(|e| matches!(e, BridgeEvent::LimitFault(_))), 1);

    assert_eq!(rig.exchange(1, b":Mn#"), "E:MechanicalConflict#");
    assert!(rig.exchange(1, b":GU#").contains('f'));

    rig.io.set_input(LogicalPin::LimitSense, false);
    rig.cycle();
    assert_eq!(rig.events(|e| *e == BridgeEvent::LimitCleared), 1);
    assert_eq!(rig.exchange(1, b":GU#"), "nNpE#");
}

#[test]
fn disconnect_mid_slew_keeps_moving_and_discards_reply() {
    let mut rig = Rig::new();
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":Sd+01*00#:MS#"), "10");
    rig.link.disconnect(1);
    rig.cycles(30);

    assert!(rig.bridge.sessions().is_empty());
    assert_eq!(rig.bridge.snapshot().position.axis2, ONE_DEG);
    assert_eq!(
        rig.events(|e| matches!(e, BridgeEvent::ResponseDiscarded { .. })),
        1
    );
}

// ── Park ─────────────────────────────────────────────────────

fn near_park() -> BridgeConfig {
    BridgeConfig {
        park_axis1_arcsec: 0,
        park_axis2_arcsec: ONE_DEG,
        ..quiet()
    }
}

#[test]
fn park_persists_across_reboot() {
    let mut rig = Rig::with_config(near_park());
    rig.connect(1);
    assert_eq!(rig.exchange(1, b":hP#"), "1");
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Parking);
    rig.cycles(30);

    let state = rig.bridge.snapshot();
    assert!(state.parked);
    assert_eq!(state.mode, MountMode::Parked);
    assert!(!rig.io.level(LogicalPin::Axis1Enable));
    assert!(!rig.io.level(LogicalPin::Axis2Enable));

    let mut rig = rig.reboot(near_park());
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Parked);
    assert_eq!(rig.motion.position().axis2, ONE_DEG);
    assert_eq!(rig.sink.events[0], BridgeEvent::Started(MountMode::Parked));

    rig.connect(1);
    assert_eq!(rig.exchange(1, b":GU#"), "nNPE#");
    assert_eq!(rig.exchange(1, b":MS#"), "E:MechanicalConflict#");
    assert_eq!(rig.exchange(1, b":hP#"), "1");

    assert_eq!(rig.exchange(1, b":hR#"), "1");
    rig.cycle();
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Stopped);
    assert!(rig.io.level(LogicalPin::Axis1Enable));

    // Unpark is persisted too.
    let rig = rig.reboot(near_park());
    assert_eq!(rig.bridge.snapshot().mode, MountMode::Stopped);
}

// ── Broadcast ────────────────────────────────────────────────

#[test]
fn mode_changes_reach_every_session_when_enabled() {
    let mut rig = Rig::with_config(BridgeConfig {
        broadcast_state_changes: true,
        ..quiet()
    });
    rig.connect(1);
    rig.connect(2);
    assert_eq!(rig.exchange(1, b":Te#"), "1!MODE:Tracking#");
    assert_eq!(rig.link.take_text(2), "!MODE:Tracking#");
}

#[test]
fn mode_changes_are_silent_by_default() {
    let mut rig = Rig::new();
    rig.connect(1);
    rig.connect(2);
    assert_eq!(rig.exchange(1, b":Te#"), "1");
    assert_eq!(rig.link.take_text(2), "");
    assert_eq!(
        rig.events(|e| matches!(
            e,
            BridgeEvent::ModeChanged {
                to: MountMode::Tracking,
                ..
            }
        )),
        1
    );
}

// ── Timer-paced loop ─────────────────────────────────────────

#[test]
fn periodic_timer_paces_the_control_tick() {
    let mut rig = Rig::new();
    let due = Arc::new(AtomicU32::new(0));
    let flag = due.clone();
    let id = rig
        .timer
        .start_periodic_timer(
            Duration::from_millis(20),
            Box::new(move || {
                flag.fetch_add(1, Ordering::Release);
            }),
        )
        .unwrap();
    rig.connect(1);
    rig.link.send(1, b":GR#");

    // Without a due tick the query waits in the immediate lane.
    rig.bridge.poll_transport(rig.now, &mut rig.sink);
    rig.bridge.dispatch_responses(&mut rig.sink);
    assert_eq!(rig.link.take_text(1), "");

    rig.timer.fire_all();
    if due.swap(0, Ordering::Acquire) > 0 {
        rig.bridge
            .control_tick(rig.now + 20, &mut rig.motion, &mut rig.io, &mut rig.sink);
    }
    rig.bridge.dispatch_responses(&mut rig.sink);
    assert_eq!(rig.link.take_text(1), "00:00:00#");

    rig.timer.cancel(id);
    assert_eq!(rig.timer.active(), 0);
}
