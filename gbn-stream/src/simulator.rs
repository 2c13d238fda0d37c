//! In-memory lossy link for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`SimTransport::pair`] returns two connected [`Transport`] ends joined by
//! tokio channels.  Each end applies a fault model to what it *sends*:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Scripted drop    | Drop the n-th first transmission of a data segment.|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.      |
//! | Duplication      | Deliver a datagram twice.                          |
//! | Reordering       | Hold a datagram back so the next one overtakes it. |
//!
//! Randomness comes from a seeded [`StdRng`], so a failing run replays
//! exactly.  Combined with tokio's paused clock the whole transfer is
//! deterministic.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::packet::{Segment, HEADER_LEN};
use crate::socket::Transport;

/// Which datagrams the random faults may hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultScope {
    #[default]
    All,
    /// Only datagrams carrying stream bytes.
    DataOnly,
    /// Everything except segments with SYN or FIN set.
    SkipControl,
}

impl FaultScope {
    fn covers(self, bytes: &[u8]) -> bool {
        match self {
            FaultScope::All => true,
            FaultScope::DataOnly => bytes.len() > HEADER_LEN,
            FaultScope::SkipControl => {
                Segment::decode(bytes).map_or(true, |seg| !seg.is_syn() && !seg.is_fin())
            }
        }
    }
}

/// Fault model for one direction of a simulated link.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    pub scope: FaultScope,
    /// 1-based indices of first-transmission data segments to drop.
    /// Retransmissions of the same bytes are never affected.
    pub drop_data_segments: Vec<usize>,
    pub seed: u64,
}

impl SimulatorConfig {
    /// A link that loses every datagram with probability `rate`.
    pub fn lossy(rate: f64, seed: u64) -> Self {
        Self {
            loss_rate: rate,
            seed,
            ..Self::default()
        }
    }

    /// A link that drops exactly the listed first-transmission data segments.
    pub fn dropping(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            drop_data_segments: indices.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Datagrams seen by one end, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

type Datagram = (Vec<u8>, SocketAddr);

/// One end of a simulated link.
#[derive(Debug)]
pub struct SimTransport {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    tx: UnboundedSender<Datagram>,
    rx: UnboundedReceiver<Datagram>,
    config: SimulatorConfig,
    rng: StdRng,
    /// Sequence numbers of data segments already sent once.
    seen_data: HashSet<u32>,
    data_sent: usize,
    held: Option<Vec<u8>>,
    stats: LinkStats,
}

impl SimTransport {
    /// Two connected ends.  `cfg_a` governs what `a` sends, `cfg_b` what `b`
    /// sends.
    pub fn pair(
        addr_a: SocketAddr,
        addr_b: SocketAddr,
        cfg_a: SimulatorConfig,
        cfg_b: SimulatorConfig,
    ) -> (SimTransport, SimTransport) {
        let (tx_ab, rx_ab) = mpsc::unbounded_channel();
        let (tx_ba, rx_ba) = mpsc::unbounded_channel();
        (
            SimTransport::new(addr_a, addr_b, tx_ab, rx_ba, cfg_a),
            SimTransport::new(addr_b, addr_a, tx_ba, rx_ab, cfg_b),
        )
    }

    fn new(
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
        tx: UnboundedSender<Datagram>,
        rx: UnboundedReceiver<Datagram>,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            local_addr,
            remote_addr,
            tx,
            rx,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            seen_data: HashSet::new(),
            data_sent: 0,
            held: None,
            stats: LinkStats::default(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn deliver(&mut self, bytes: Vec<u8>) {
        // A closed channel behaves like an unreachable host.
        if self.tx.send((bytes, self.local_addr)).is_err() {
            log::trace!("[sim] {} -> {}: peer gone", self.local_addr, self.remote_addr);
        }
    }

    fn flush_held(&mut self) {
        if let Some(bytes) = self.held.take() {
            self.deliver(bytes);
        }
    }

    fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.random_bool(p.min(1.0))
    }

    /// Whether the scripted plan drops this datagram.
    fn scripted_drop(&mut self, bytes: &[u8]) -> bool {
        let Ok(seg) = Segment::decode(bytes) else {
            return false;
        };
        if !seg.has_data() || !self.seen_data.insert(seg.seq) {
            return false;
        }
        self.data_sent += 1;
        self.config.drop_data_segments.contains(&self.data_sent)
    }
}

impl Transport for SimTransport {
    async fn send_to(&mut self, bytes: &[u8], peer: SocketAddr) -> io::Result<()> {
        self.stats.sent += 1;
        if peer != self.remote_addr {
            log::trace!("[sim] no route to {peer}");
            return Ok(());
        }

        if self.scripted_drop(bytes) {
            self.stats.dropped += 1;
            log::debug!("[sim] dropped data segment #{}", self.data_sent);
            return Ok(());
        }

        let faulty = self.config.scope.covers(bytes);
        if faulty && self.chance(self.config.loss_rate) {
            self.stats.dropped += 1;
            log::trace!("[sim] lost {} bytes", bytes.len());
            return Ok(());
        }

        let duplicate = faulty && self.chance(self.config.duplicate_rate);
        if faulty && self.held.is_none() && self.chance(self.config.reorder_rate) {
            self.stats.reordered += 1;
            self.held = Some(bytes.to_vec());
            return Ok(());
        }

        self.deliver(bytes.to_vec());
        if duplicate {
            self.stats.duplicated += 1;
            self.deliver(bytes.to_vec());
        }
        self.flush_held();
        Ok(())
    }

    async fn recv_timeout(&mut self, wait: Duration) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
        // Nothing stays held across a receive.
        self.flush_held();

        if wait.is_zero() {
            return match self.rx.try_recv() {
                Ok(got) => Ok(Some(got)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
            };
        }
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(got)) => Ok(Some(got)),
            Ok(None) => {
                // Peer dropped its end: stay silent for the full wait.
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Err(_elapsed) => Ok(None),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
