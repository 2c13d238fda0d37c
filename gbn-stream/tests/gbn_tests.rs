//! Integration tests for Go-Back-N data transfer.
//!
//! Most tests run both drivers in one task over the simulated link with a
//! paused tokio clock, so retransmission timeouts elapse instantly and every
//! run is reproducible.  One test repeats the transfer over real loopback
//! UDP sockets.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gbn_stream::{
    packet::Segment,
    serve,
    simulator::{FaultScope, SimTransport, SimulatorConfig},
    transfer, Initiator, Phase, ReliabilityMode, Responder, TransferConfig, TransferReport,
    Transport, UdpTransport,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CLIENT: &str = "10.0.0.1:4000";
const SERVER: &str = "10.0.0.2:8080";

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// Deterministic, non-repeating-looking test payload.
fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>().into()
}

/// Run one transfer over a simulated link; returns both reports and the sink.
async fn run_sim(
    data: Bytes,
    cfg: &TransferConfig,
    to_server: SimulatorConfig,
    to_client: SimulatorConfig,
) -> (TransferReport, TransferReport, Vec<u8>) {
    let (mut a, mut b) = SimTransport::pair(addr(CLIENT), addr(SERVER), to_server, to_client);
    let mut sink = Vec::new();
    let (sent, received) = tokio::join!(
        transfer(&mut a, addr(SERVER), data, cfg),
        serve(&mut b, &mut sink, cfg),
    );
    (
        sent.expect("sender failed"),
        received.expect("receiver failed"),
        sink,
    )
}

// ---------------------------------------------------------------------------
// Test 1: one lost segment, one retransmission round
// ---------------------------------------------------------------------------

/// 5000 bytes with MSS 1024 and a 4096-byte window; the third data segment
/// is lost once.  Segments 1-2 are acknowledged, 4 and 5 arrive past the
/// gap, so a single timeout resends [2048, 5000) and the stream completes.
#[tokio::test(start_paused = true)]
async fn test_gbn_single_loss_single_round() {
    let cfg = TransferConfig::default().with_initial_seq(0);
    let data = payload(5000);

    let (sent, received, sink) = run_sim(
        data.clone(),
        &cfg,
        SimulatorConfig::dropping([3]),
        SimulatorConfig::default(),
    )
    .await;

    assert_eq!(sink, data);
    assert_eq!(sent.final_phase, Phase::Closed);
    assert_eq!(received.final_phase, Phase::Closed);

    assert_eq!(sent.stats.retransmit_rounds, 1);
    assert_eq!(sent.stats.retransmitted_segments, 3);
    assert_eq!(sent.stats.data_segments_sent, 5);

    assert_eq!(received.stats.out_of_order_segments, 2);
    assert_eq!(received.stats.accepted_segments, 5);
    assert_eq!(received.bytes, 5000);
}

// ---------------------------------------------------------------------------
// Test 2: every reliability mode on a clean link
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_all_modes_complete_without_loss() {
    for mode in [
        ReliabilityMode::GoBackN,
        ReliabilityMode::PerPacketAck,
        ReliabilityMode::NoAck,
    ] {
        let cfg = TransferConfig::default().with_mode(mode);
        let data = payload(10_000);
        let (sent, received, sink) = run_sim(
            data.clone(),
            &cfg,
            SimulatorConfig::default(),
            SimulatorConfig::default(),
        )
        .await;

        assert_eq!(sink, data, "{mode}: stream corrupted");
        assert_eq!(sent.final_phase, Phase::Closed, "{mode}");
        assert_eq!(received.final_phase, Phase::Closed, "{mode}");
        assert_eq!(sent.stats.retransmit_rounds, 0, "{mode}");
    }
}

/// Stop-and-wait never has more than one segment unacknowledged, so the
/// receiver never sees anything out of order.
#[tokio::test(start_paused = true)]
async fn test_per_packet_ack_sends_one_segment_at_a_time() {
    let cfg = TransferConfig {
        mss: 100,
        window_size: 800,
        ..TransferConfig::default().with_mode(ReliabilityMode::PerPacketAck)
    };
    let (sent, received, _) = run_sim(
        payload(1000),
        &cfg,
        SimulatorConfig::default(),
        SimulatorConfig::default(),
    )
    .await;
    assert_eq!(sent.stats.data_segments_sent, 10);
    assert_eq!(received.stats.accepted_segments, 10);
    assert_eq!(received.stats.out_of_order_segments, 0);
}

/// Without acknowledgements a lost segment is simply missing from the sink.
#[tokio::test(start_paused = true)]
async fn test_no_ack_mode_skips_lost_bytes() {
    let cfg = TransferConfig::default().with_mode(ReliabilityMode::NoAck);
    let data = payload(5000);
    let (sent, received, sink) = run_sim(
        data.clone(),
        &cfg,
        SimulatorConfig::dropping([2]),
        SimulatorConfig::default(),
    )
    .await;

    let mut expected = data[..1024].to_vec();
    expected.extend_from_slice(&data[2048..]);
    assert_eq!(sink, expected);
    assert_eq!(sent.stats.retransmit_rounds, 0);
    assert_eq!(received.final_phase, Phase::Closed);
}

// ---------------------------------------------------------------------------
// Test 3: random loss, duplication and reordering
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_survives_seeded_faults() {
    let cfg = TransferConfig {
        mss: 512,
        window_size: 4096,
        ..TransferConfig::default()
    };
    let data = payload(64 * 1024);

    // Data may be lost, duplicated or reordered; ACKs may be lost.  SYN|ACK
    // and FIN segments from the responder are spared.
    let to_server = SimulatorConfig {
        loss_rate: 0.2,
        duplicate_rate: 0.05,
        reorder_rate: 0.1,
        scope: FaultScope::DataOnly,
        seed: 0x5eed,
        ..SimulatorConfig::default()
    };
    let to_client = SimulatorConfig {
        loss_rate: 0.2,
        scope: FaultScope::SkipControl,
        seed: 0xace,
        ..SimulatorConfig::default()
    };

    let (sent, received, sink) = run_sim(data.clone(), &cfg, to_server, to_client).await;

    assert_eq!(sink.len(), data.len());
    assert!(sink == data, "stream corrupted under loss");
    assert!(sent.stats.retransmit_rounds > 0);
    assert_eq!(received.final_phase, Phase::Closed);
    assert_eq!(received.bytes, data.len() as u64);
}

/// The same seed produces the same run.
#[tokio::test(start_paused = true)]
async fn test_seeded_runs_are_reproducible() {
    let cfg = TransferConfig::default().with_initial_seq(77);
    let lossy = || SimulatorConfig {
        scope: FaultScope::DataOnly,
        ..SimulatorConfig::lossy(0.3, 1234)
    };

    let (first, _, _) = run_sim(payload(20_000), &cfg, lossy(), SimulatorConfig::default()).await;
    let (second, _, _) = run_sim(payload(20_000), &cfg, lossy(), SimulatorConfig::default()).await;
    assert_eq!(first.stats, second.stats);
}

// ---------------------------------------------------------------------------
// Test 4: engines alone, segment by segment
// ---------------------------------------------------------------------------

/// Pump segments between the two engines by hand: a reordered pair produces
/// a duplicate cumulative ACK, and the timeout resends exactly the unacked
/// tail of the window.
#[test]
fn test_engines_gap_and_go_back() {
    let client = addr(CLIENT);
    let server = addr(SERVER);
    let cfg = TransferConfig {
        mss: 4,
        window_size: 12,
        ..TransferConfig::default()
    };
    let rto = cfg.retransmit_timeout;
    let t0 = Instant::now();

    let mut init = Initiator::new(0, server, Bytes::from_static(b"aaaabbbbcccc"), &cfg).unwrap();
    let mut resp = Responder::new(900, &cfg).unwrap();

    let syn = init.open(t0);
    let synack = resp.on_segment(&syn[0], client, t0).replies;
    let ack = init.on_segment(&synack[0], server, t0);
    resp.on_segment(&ack[0], client, t0);

    let window: Vec<Segment> = init.poll(t0).unwrap();
    assert_eq!(window.len(), 3);

    // Deliver the third segment before the second; the first is lost.
    let r3 = resp.on_segment(&window[2], client, t0);
    assert_eq!(r3.delivered, None);
    assert_eq!(r3.replies[0].ack, 1);
    let r2 = resp.on_segment(&window[1], client, t0);
    assert_eq!(r2.replies[0].ack, 1);

    // Duplicate ACKs leave the window untouched.
    init.on_segment(&r3.replies[0], server, t0);
    init.on_segment(&r2.replies[0], server, t0);
    assert_eq!(init.window().base(), 1);

    let resent = init.poll(t0 + rto).unwrap();
    assert_eq!(resent, window);

    let mut sink = Vec::new();
    for seg in &resent {
        let inbound = resp.on_segment(seg, client, t0 + rto);
        sink.extend_from_slice(&inbound.delivered.unwrap());
        init.on_segment(&inbound.replies[0], server, t0 + rto);
    }
    assert_eq!(sink, b"aaaabbbbcccc");
    assert!(init.window().is_complete());
}

// ---------------------------------------------------------------------------
// Test 5: real sockets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gbn_transfer_over_loopback_udp() {
    let mut server = UdpTransport::bind(addr("127.0.0.1:0")).await.expect("bind server");
    let server_addr = server.local_addr();
    let cfg = TransferConfig::default();
    let data = payload(100_000);

    let server_cfg = cfg.clone();
    let server_task = tokio::spawn(async move {
        let mut sink = Vec::new();
        serve(&mut server, &mut sink, &server_cfg)
            .await
            .expect("serve");
        sink
    });

    let mut client = UdpTransport::bind(addr("127.0.0.1:0")).await.expect("bind client");
    let report = tokio::time::timeout(
        Duration::from_secs(30),
        transfer(&mut client, server_addr, data.clone(), &cfg),
    )
    .await
    .expect("transfer timed out")
    .expect("transfer failed");
    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(report.final_phase, Phase::Closed);

    let sink = tokio::time::timeout(Duration::from_secs(30), server_task)
        .await
        .expect("server timed out")
        .expect("server task panicked");
    assert_eq!(sink, data);
}
