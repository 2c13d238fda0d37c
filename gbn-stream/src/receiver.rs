//! Responder engine: passive open, in-order delivery, teardown answer.
//!
//! [`Responder`] combines a [`Connection`] in the responder role with a
//! [`ReceiveAssembler`].  Like [`crate::sender::Initiator`] it performs no
//! I/O: every call returns an [`Inbound`] describing the replies to send,
//! the bytes to hand to the payload sink and whether the peer has finished.
//!
//! The responder acknowledges each data segment immediately (unless the
//! connection runs [`crate::config::ReliabilityMode::NoAck`]) and, once in
//! `LastAck`, re-sends its FIN on a bounded teardown timer.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::{ReliabilityMode, TransferConfig};
use crate::connection::{Connection, Disposition};
use crate::error::ConnError;
use crate::gbn_receiver::{Delivery, ReceiveAssembler};
use crate::packet::Segment;
use crate::state::Phase;
use crate::stats::{DropReason, Stats};
use crate::timer::{wait_budget, ControlTimer};

/// Outcome of one inbound segment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Segments to transmit to the peer, in order.
    pub replies: Vec<Segment>,
    /// In-order stream bytes for the sink.
    pub delivered: Option<Bytes>,
    /// The peer's FIN was accepted; the sink can be closed.
    pub finished: bool,
}

/// Receiving side of one transfer.
#[derive(Debug)]
pub struct Responder {
    conn: Connection,
    assembler: ReceiveAssembler,
    mode: ReliabilityMode,
    /// FIN retries while in `LastAck`.
    control: ControlTimer,
    config: TransferConfig,
    stats: Stats,
}

impl Responder {
    pub fn new(isn: u32, config: &TransferConfig) -> Result<Self, ConnError> {
        config.validate()?;
        Ok(Self {
            conn: Connection::responder(isn, config.mode).with_window(config.advertised_window),
            assembler: ReceiveAssembler::new(0, config.mode),
            mode: config.mode,
            control: ControlTimer::new(config.teardown_timeout, config.teardown_attempts),
            config: config.clone(),
            stats: Stats::default(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.conn.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.phase() == Phase::Closed
    }

    /// Address of the connected peer, once a SYN has been accepted.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.conn.peer()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn assembler(&self) -> &ReceiveAssembler {
        &self.assembler
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Count a datagram the driver could not decode.
    pub fn note_malformed(&mut self) {
        self.stats.record_drop(DropReason::Malformed);
    }

    /// Process one inbound segment from `from`.
    pub fn on_segment(&mut self, seg: &Segment, from: SocketAddr, now: Instant) -> Inbound {
        self.stats.segments_received += 1;
        let before = self.conn.phase();
        let mut inbound = Inbound::default();

        match self.conn.advance(seg, from, &mut inbound.replies) {
            Disposition::Consumed => {
                if before == Phase::Listen {
                    self.assembler =
                        ReceiveAssembler::new(self.conn.remote_seq_expected(), self.mode);
                    log::info!("SYN from {from}");
                }
            }
            Disposition::Data => self.on_data(seg, &mut inbound),
            Disposition::PeerFinished => {
                inbound.finished = true;
                self.control.start(now);
                log::info!(
                    "peer {from} finished after {} bytes",
                    self.stats.bytes_delivered
                );
            }
            Disposition::Closed => {
                self.control.stop();
                log::info!("connection with {from} closed");
            }
            Disposition::Ignored(reason) => self.stats.record_drop(reason),
        }

        if before != Phase::Established && self.conn.phase() == Phase::Established {
            log::info!("established with {from}");
        }
        self.stats.segments_sent += inbound.replies.len() as u64;
        inbound
    }

    fn on_data(&mut self, seg: &Segment, inbound: &mut Inbound) {
        match self.assembler.on_segment(seg.seq, &seg.payload) {
            Delivery::Accepted(bytes) => {
                self.stats.accepted_segments += 1;
                self.stats.bytes_delivered += bytes.len() as u64;
                self.conn.set_remote_seq_expected(self.assembler.expected_seq());
                log::debug!(
                    "[gbn] <- DATA seq={} len={} accepted",
                    seg.seq,
                    bytes.len()
                );
                inbound.delivered = Some(bytes);
            }
            Delivery::Duplicate => {
                self.stats.duplicate_segments += 1;
                log::debug!("[gbn] <- DATA seq={} duplicate", seg.seq);
            }
            Delivery::Gap => {
                self.stats.out_of_order_segments += 1;
                log::debug!(
                    "[gbn] <- DATA seq={} out of order (expected {})",
                    seg.seq,
                    self.assembler.expected_seq()
                );
            }
        }
        if self.mode.acknowledges_data() {
            inbound.replies.push(self.conn.ack());
        }
    }

    /// Advance the teardown timer.
    ///
    /// Fails once the FIN has been sent the configured number of times
    /// without the final ACK arriving.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<Segment>, ConnError> {
        if self.conn.phase() != Phase::LastAck || !self.control.expired(now) {
            return Ok(Vec::new());
        }
        if !self.control.retry(now) {
            log::warn!("final ACK never arrived; abandoning connection");
            return Err(ConnError::TeardownExhausted {
                phase: Phase::LastAck,
                attempts: self.control.attempts(),
            });
        }
        self.stats.control_retransmits += 1;
        let out: Vec<Segment> = self.conn.pending_fin().into_iter().collect();
        self.stats.segments_sent += out.len() as u64;
        Ok(out)
    }

    /// How long the driver may block waiting for input.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        match self.conn.phase() {
            Phase::Established => self.config.poll_interval,
            Phase::LastAck => {
                wait_budget(self.control.deadline(), now, self.config.teardown_timeout)
            }
            _ => self.config.handshake_timeout,
        }
    }
}
