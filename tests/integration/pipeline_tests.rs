//! The bridge behind real transports: the I/O channel pair and TCP.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::rig::quiet;

use smartwebserver::adapters::channel_transport::ChannelTransport;
use smartwebserver::adapters::channels::IoChannels;
use smartwebserver::adapters::io_task::IoPump;
use smartwebserver::adapters::nvs::NvsStore;
use smartwebserver::adapters::tcp_server::TcpServer;
use smartwebserver::app::ports::RecordingSink;
use smartwebserver::app::service::Bridge;
use smartwebserver::config::BridgeConfig;
use smartwebserver::drivers::axes::KinematicAxes;
use smartwebserver::hal::sim::{SimLink, SimPins, SimTransport};

// ── I/O channels ─────────────────────────────────────────────

struct Pipeline {
    channels: &'static IoChannels,
    pump: IoPump<SimTransport>,
    link: SimLink,
    bridge: Bridge<ChannelTransport>,
    axes: KinematicAxes,
    pins: SimPins,
    sink: RecordingSink,
    now: u64,
}

impl Pipeline {
    fn new(config: BridgeConfig) -> Self {
        let channels: &'static IoChannels = Box::leak(Box::new(IoChannels::new()));
        let (sim, link) = SimTransport::pair();
        let mut bridge = Bridge::new(config, ChannelTransport::new(channels)).unwrap();
        let mut axes = KinematicAxes::new(7200);
        let mut sink = RecordingSink::new();
        bridge.start(&mut axes, &NvsStore::default(), &mut sink);
        Self {
            channels,
            pump: IoPump::new(sim, channels),
            link,
            bridge,
            axes,
            pins: SimPins::new(),
            sink,
            now: 0,
        }
    }

    /// One pass of the I/O task, one bridge cycle, one more I/O pass.
    fn step(&mut self) {
        self.pump.pump_inbound();
        self.now += 20;
        self.bridge
            .run_cycle(self.now, &mut self.axes, &mut self.pins, &mut self.sink);
        while let Ok(cmd) = self.channels.outbound.try_receive() {
            self.pump.handle(cmd);
        }
        self.pump.flush_writes();
    }
}

#[test]
fn channel_pipeline_answers_queries() {
    let mut p = Pipeline::new(quiet());
    p.link.connect(1);
    p.link.send(1, b":GVP#:GR#");
    p.step();
    assert_eq!(p.link.take_text(1), "SmartWebServer#00:00:00#");
}

#[test]
fn channel_pipeline_carries_bridge_close_to_socket() {
    let mut p = Pipeline::new(BridgeConfig {
        max_protocol_violations: 1,
        ..quiet()
    });
    p.link.connect(1);
    p.link.send(1, b":ZZ#");
    p.step();
    assert_eq!(p.link.take_text(1), "E:MalformedCommand#");
    assert!(p.link.was_closed_by_bridge(1));
    assert!(p.bridge.sessions().is_empty());
}

#[test]
fn channel_pipeline_reports_client_hangup() {
    let mut p = Pipeline::new(quiet());
    p.link.connect(1);
    p.step();
    assert_eq!(p.bridge.sessions().len(), 1);
    p.link.disconnect(1);
    p.step();
    assert!(p.bridge.sessions().is_empty());
    assert!(!p.link.was_closed_by_bridge(1));
}

// ── TCP loopback ─────────────────────────────────────────────

#[test]
fn tcp_client_gets_product_name() {
    let server = TcpServer::bind(0).unwrap();
    let port = server.local_addr().unwrap().port();
    let mut bridge = Bridge::new(quiet(), server).unwrap();
    let mut axes = KinematicAxes::new(7200);
    let mut pins = SimPins::new();
    let mut sink = RecordingSink::new();
    bridge.start(&mut axes, &NvsStore::default(), &mut sink);

    let mut client = TcpStream::connect(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(5)))
        .unwrap();
    client.write_all(b":GVP#").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut now = 0;
    let mut reply = Vec::new();
    let mut buf = [0u8; 64];
    while !reply.ends_with(b"#") && Instant::now() < deadline {
        now += 20;
        bridge.run_cycle(now, &mut axes, &mut pins, &mut sink);
        match client.read(&mut buf) {
            Ok(n) => reply.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {e}"),
        }
    }
    assert_eq!(reply, b"SmartWebServer#");
    assert_eq!(bridge.sessions().len(), 1);
}
