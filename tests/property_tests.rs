//! Property and fuzz-style tests for robustness of core data structures.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;

use smartwebserver::adapters::nvs::NvsStore;
use smartwebserver::app::arbiter::{Arbiter, Work};
use smartwebserver::app::ports::NullSink;
use smartwebserver::app::service::Bridge;
use smartwebserver::config::BridgeConfig;
use smartwebserver::drivers::axes::KinematicAxes;
use smartwebserver::error::Status;
use smartwebserver::hal::sim::{SimPins, SimTransport};
use smartwebserver::mount::state::{format_dec, format_ra};
use smartwebserver::protocol::codec::{Frame, FrameDecoder};
use smartwebserver::protocol::command::{CommandClass, CommandRequest, Opcode, Operand, parse_body};

// ── Frame decoder ────────────────────────────────────────────

fn frames(decoder: &mut FrameDecoder, chunks: &[&[u8]]) -> Vec<Frame> {
    let mut out = Vec::new();
    for chunk in chunks {
        decoder.feed(chunk, |f| out.push(f));
    }
    out
}

proptest! {
    /// No body ever exceeds the limit or contains the terminator.
    #[test]
    fn decoder_bodies_are_bounded(
        data in proptest::collection::vec(any::<u8>(), 0..512),
        max_len in 1usize..=64,
    ) {
        let mut d = FrameDecoder::new(max_len);
        for frame in frames(&mut d, &[&data]) {
            if let Frame::Body(body) = frame {
                prop_assert!(body.len() <= max_len);
                prop_assert!(!body.contains(&b'#'));
            }
        }
        prop_assert!(d.pending() <= max_len);
    }

    /// How the stream is split across reads never changes the frames.
    #[test]
    fn decoder_is_chunking_invariant(
        data in proptest::collection::vec(
            prop_oneof![Just(b':'), Just(b'#'), Just(0x06u8), b'A'..=b'z'],
            0..256,
        ),
        split in any::<prop::sample::Index>(),
    ) {
        let at = split.index(data.len() + 1);
        let (a, b) = data.split_at(at);
        let whole = frames(&mut FrameDecoder::new(32), &[&data]);
        let parts = frames(&mut FrameDecoder::new(32), &[a, b]);
        prop_assert_eq!(whole, parts);
    }
}

// ── Command parser ───────────────────────────────────────────

proptest! {
    /// Any body parses or is malformed; operands stay in range.
    #[test]
    fn parser_never_panics_and_bounds_operands(
        body in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        match parse_body(&body) {
            Ok((_, Operand::Ra(v))) => prop_assert!((0..24 * 3600 * 15).contains(&v)),
            Ok((_, Operand::Dec(v))) => prop_assert!((-90 * 3600..=90 * 3600).contains(&v)),
            Ok((_, Operand::None)) => {}
            Err(status) => prop_assert_eq!(status, Status::MalformedCommand),
        }
    }

    /// Well-formed declinations parse back to what was written.
    #[test]
    fn parser_reads_formatted_dec(
        south in any::<bool>(), deg in 0i64..=89, min in 0i64..60, sec in 0i64..60,
    ) {
        let magnitude = deg * 3600 + min * 60 + sec;
        let arcsec = if south { -magnitude } else { magnitude };
        let text = format_dec(arcsec);
        let mut body = b"Sd".to_vec();
        body.extend_from_slice(&text[..text.len() - 1]);
        prop_assert_eq!(parse_body(&body), Ok((Opcode::SetTargetDec, Operand::Dec(arcsec))));
    }

    /// Right ascension always renders as `HH:MM:SS#` within a day.
    #[test]
    fn ra_format_is_fixed_width(axis1 in any::<i32>()) {
        let text = format_ra(i64::from(axis1));
        prop_assert_eq!(text.len(), 9);
        let hours: u32 = core::str::from_utf8(&text[..2]).unwrap().parse().unwrap();
        prop_assert!(hours < 24);
        prop_assert_eq!(text[8], b'#');
    }
}

// ── Arbiter ──────────────────────────────────────────────────

const OPCODES: [Opcode; 9] = [
    Opcode::GetRa,
    Opcode::GetTargetDec,
    Opcode::TrackingOn,
    Opcode::Unpark,
    Opcode::Slew,
    Opcode::Park,
    Opcode::MoveNorth,
    Opcode::MoveSouth,
    Opcode::Stop,
];

const STOP: usize = 8;

#[derive(Debug, Clone)]
enum ArbOp {
    Submit(usize, u32),
    Drain,
    Release,
}

fn arb_op(opcodes: usize) -> impl Strategy<Value = ArbOp> {
    prop_oneof![
        3 => (0..opcodes, 1u32..=4).prop_map(|(o, s)| ArbOp::Submit(o, s)),
        1 => Just(ArbOp::Drain),
        1 => Just(ArbOp::Release),
    ]
}

/// Runs `ops` and returns the (session, request id) pairs in the order
/// they left the arbiter.  Asserts conservation along the way.
fn run_arbiter(ops: &[ArbOp], depth: usize) -> Result<Vec<(u32, u32)>, TestCaseError> {
    let mut arbiter = Arbiter::new(depth);
    let mut left = Vec::new();
    let mut submitted = 0usize;

    for (i, op) in ops.iter().enumerate() {
        let id = u32::try_from(i).unwrap() + 1;
        match *op {
            ArbOp::Submit(o, session) => {
                submitted += 1;
                arbiter.submit(CommandRequest {
                    id,
                    session,
                    opcode: OPCODES[o],
                    operand: Operand::None,
                    arrival_ms: id.into(),
                    seq: id,
                });
            }
            ArbOp::Drain => {
                while let Some(work) = arbiter.take_ready() {
                    left.push((work.session(), work.request_id()));
                }
                if let Some(req) = arbiter.promote(u64::from(id)) {
                    left.push((req.session, req.id));
                }
            }
            ArbOp::Release => {
                arbiter.release();
            }
        }
        prop_assert!(arbiter.queued() <= depth);
        prop_assert!(arbiter.executing_count() <= 1);
    }

    prop_assert_eq!(submitted, arbiter.pending_work() + left.len());
    let mut ids: Vec<_> = left.iter().map(|&(_, id)| id).collect();
    ids.sort_unstable();
    ids.dedup();
    prop_assert_eq!(ids.len(), left.len(), "a request left the arbiter twice");
    Ok(left)
}

proptest! {
    /// Every admitted request is still waiting or has left exactly once.
    /// The queue never exceeds its depth.
    #[test]
    fn arbiter_conserves_requests(
        ops in proptest::collection::vec(arb_op(OPCODES.len()), 1..=48),
        depth in 1usize..=8,
    ) {
        run_arbiter(&ops, depth)?;
    }

    /// Without stops, each session's requests leave in submission order.
    #[test]
    fn arbiter_keeps_each_sessions_order(
        ops in proptest::collection::vec(arb_op(STOP), 1..=48),
        depth in 1usize..=8,
    ) {
        let left = run_arbiter(&ops, depth)?;
        for session in 1..=4 {
            let ids: Vec<u32> = left.iter().filter(|l| l.0 == session).map(|l| l.1).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "session {} reordered: {:?}", session, ids);
        }
    }

    /// With the slot free, motion commands collapse to one queued entry
    /// and every predecessor is answered `Superseded` in order.
    #[test]
    fn motion_commands_collapse_in_queue(
        picks in proptest::collection::vec(4usize..8, 1..=16),
    ) {
        let mut arbiter = Arbiter::new(8);
        for (i, &o) in picks.iter().enumerate() {
            let id = u32::try_from(i).unwrap() + 1;
            prop_assert!(matches!(OPCODES[o].class(), CommandClass::Supersede(_)));
            arbiter.submit(CommandRequest {
                id,
                session: 1,
                opcode: OPCODES[o],
                operand: Operand::None,
                arrival_ms: 0,
                seq: id,
            });
        }
        prop_assert_eq!(arbiter.queued(), 1);
        let mut answered = Vec::new();
        while let Some(work) = arbiter.take_ready() {
            match work {
                Work::Verdict(v) => {
                    prop_assert_eq!(v.status, Status::Superseded);
                    answered.push(v.request_id);
                }
                Work::Command(r) => prop_assert!(false, "unexpected command {:?}", r),
            }
        }
        let expected: Vec<u32> = (1..u32::try_from(picks.len()).unwrap()).collect();
        prop_assert_eq!(answered, expected);
        prop_assert_eq!(arbiter.promote(0).map(|r| r.opcode), picks.last().map(|&o| OPCODES[o]));
    }
}

// ── Whole bridge ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary client traffic never panics the bridge, never runs two
    /// commands at once and never drives axis 2 past the pole.
    #[test]
    fn bridge_survives_arbitrary_traffic(
        traffic in proptest::collection::vec(
            (1u16..=3, proptest::collection::vec(
                prop_oneof![
                    Just(b':'), Just(b'#'), Just(0x06u8),
                    Just(b'M'), Just(b'S'), Just(b'Q'), Just(b'h'), Just(b'P'),
                    Just(b'n'), Just(b's'), Just(b'd'), Just(b'+'), Just(b'*'),
                    b'0'..=b'9', b'A'..=b'z',
                ],
                0..24,
            )),
            1..=48,
        ),
    ) {
        let (t, link) = SimTransport::pair();
        let config = BridgeConfig { rate_limit_per_sec: 0, ..Default::default() };
        let mut bridge = Bridge::new(config, t).unwrap();
        let mut axes = KinematicAxes::new(7200);
        let mut pins = SimPins::new();
        let mut sink = NullSink;
        bridge.start(&mut axes, &NvsStore::default(), &mut sink);
        for conn in 1..=3 {
            link.connect(conn);
        }

        let mut now = 0;
        for (conn, bytes) in &traffic {
            link.send(*conn, bytes);
            now += 20;
            bridge.run_cycle(now, &mut axes, &mut pins, &mut sink);
            prop_assert!(bridge.arbiter().executing_count() <= 1);
            prop_assert!(bridge.snapshot().position.axis2.abs() <= 90 * 3600);
        }
        prop_assert_eq!(bridge.pending_responses(), 0);
    }
}
