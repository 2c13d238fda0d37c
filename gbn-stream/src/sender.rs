//! Initiator engine: handshake, Go-Back-N transfer, teardown.
//!
//! [`Initiator`] combines a [`Connection`] in the initiator role with a
//! [`SendWindow`] over the whole payload.  It does **not** touch the
//! transport; a driver feeds it inbound segments and clock ticks and
//! transmits whatever it returns:
//!
//! ```text
//!  open(now) ──▶ SYN
//!  loop {
//!      poll(now)            ──▶ retransmissions, new data, FIN
//!      on_segment(seg, now) ──▶ handshake ACK, final ACK
//!  } until is_finished(now)
//! ```
//!
//! Each [`Initiator::poll`] checks the retransmission timer and then fills
//! the window; once every byte is acknowledged it emits the FIN.
//!
//! After the final ACK the engine is `Closed` but keeps answering for
//! [`TransferConfig::linger`]: if that ACK is lost the peer repeats its FIN,
//! and each repeat is acknowledged again and restarts the linger.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::TransferConfig;
use crate::connection::{Connection, Disposition};
use crate::error::ConnError;
use crate::gbn_sender::{AckOutcome, SendWindow};
use crate::packet::Segment;
use crate::state::Phase;
use crate::stats::{DropReason, Stats};
use crate::timer::{wait_budget, ControlTimer};

/// Sending side of one transfer.
#[derive(Debug)]
pub struct Initiator {
    conn: Connection,
    peer: SocketAddr,
    window: SendWindow,
    /// SYN retries during the handshake, FIN retries during teardown.
    control: ControlTimer,
    /// End of the post-close linger.
    linger_until: Option<Instant>,
    config: TransferConfig,
    stats: Stats,
}

impl Initiator {
    /// Prepare to send `payload` to `peer`.  The first stream byte carries
    /// sequence number `isn + 1`.
    pub fn new(
        isn: u32,
        peer: SocketAddr,
        payload: Bytes,
        config: &TransferConfig,
    ) -> Result<Self, ConnError> {
        config.validate()?;
        let conn =
            Connection::initiator(isn, peer, config.mode).with_window(config.advertised_window);
        let window = SendWindow::new(
            isn.wrapping_add(1),
            payload,
            config.mss,
            config.window_size,
            config.retransmit_timeout,
            config.mode,
        )?
        .with_window(config.advertised_window);

        Ok(Self {
            conn,
            peer,
            window,
            control: ControlTimer::new(config.handshake_timeout, config.handshake_attempts),
            linger_until: None,
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

    /// `true` once the connection is closed and the linger has run out.
    pub fn is_finished(&self, now: Instant) -> bool {
        self.is_closed() && !self.linger_until.is_some_and(|end| now < end)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Count a datagram the driver could not decode.
    pub fn note_malformed(&mut self) {
        self.stats.record_drop(DropReason::Malformed);
    }

    fn emit(&mut self, out: Vec<Segment>) -> Vec<Segment> {
        self.stats.segments_sent += out.len() as u64;
        out
    }

    /// Start the handshake: the first SYN.
    pub fn open(&mut self, now: Instant) -> Vec<Segment> {
        self.control.start(now);
        log::info!("connecting to {}", self.peer());
        let syn = self.conn.syn();
        self.emit(vec![syn])
    }

    /// Process one inbound segment; returns replies to transmit.
    pub fn on_segment(&mut self, seg: &Segment, from: SocketAddr, now: Instant) -> Vec<Segment> {
        self.stats.segments_received += 1;
        let before = self.conn.phase();
        let mut out = Vec::new();

        match self.conn.advance(seg, from, &mut out) {
            Disposition::Data => match self.window.on_ack(seg.ack, now) {
                AckOutcome::Advanced(n) => {
                    log::debug!("[gbn] <- ACK ack={} (+{n} bytes)", seg.ack);
                }
                AckOutcome::Duplicate => log::trace!("[gbn] <- duplicate ACK ack={}", seg.ack),
                AckOutcome::OutOfRange => {
                    log::debug!("[gbn] <- ACK ack={} beyond next_seq", seg.ack)
                }
            },
            Disposition::Ignored(reason) => self.stats.record_drop(reason),
            Disposition::Consumed if before == Phase::Closed => {
                log::debug!("peer repeated its FIN; final ACK re-sent");
                self.stats.control_retransmits += 1;
                self.linger_until = Some(now + self.config.linger);
            }
            Disposition::Consumed | Disposition::PeerFinished | Disposition::Closed => {}
        }

        match (before, self.conn.phase()) {
            (Phase::SynSent, Phase::Established) => {
                self.control.stop();
                log::info!(
                    "established with {}: sending {} bytes",
                    self.peer(),
                    self.window.total_len()
                );
            }
            (Phase::FinWait, Phase::Closed) => {
                self.control.stop();
                self.linger_until = Some(now + self.config.linger);
                log::info!("connection to {} closed", self.peer());
            }
            _ => {}
        }
        self.emit(out)
    }

    /// Advance timers and the send window.
    ///
    /// Fails when the handshake or the teardown runs out of attempts.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<Segment>, ConnError> {
        let mut out = Vec::new();

        match self.conn.phase() {
            Phase::SynSent => {
                if self.control.expired(now) {
                    if !self.control.retry(now) {
                        log::warn!("no SYN|ACK from {}; giving up", self.peer());
                        return Err(ConnError::HandshakeFailed {
                            attempts: self.control.attempts(),
                        });
                    }
                    log::debug!("SYN timeout; attempt {}", self.control.attempts());
                    self.stats.control_retransmits += 1;
                    out.push(self.conn.syn());
                }
            }
            Phase::Established => {
                let ack = self.conn.remote_seq_expected();

                let resent = self.window.on_timer(ack, now);
                if !resent.is_empty() {
                    self.stats.retransmit_rounds += 1;
                    self.stats.retransmitted_segments += resent.len() as u64;
                    out.extend(resent);
                }

                let fresh = self.window.fill(ack, now);
                self.stats.data_segments_sent += fresh.len() as u64;
                out.extend(fresh);

                if self.window.is_complete() {
                    log::info!(
                        "all {} bytes acknowledged; closing",
                        self.window.total_len()
                    );
                    out.push(self.conn.begin_close(self.window.end_seq()));
                    self.control = ControlTimer::new(
                        self.config.teardown_timeout,
                        self.config.teardown_attempts,
                    );
                    self.control.start(now);
                }
            }
            Phase::FinWait => {
                if self.control.expired(now) {
                    if !self.control.retry(now) {
                        log::warn!(
                            "teardown with {} not acknowledged; abandoning",
                            self.peer()
                        );
                        return Err(ConnError::TeardownExhausted {
                            phase: Phase::FinWait,
                            attempts: self.control.attempts(),
                        });
                    }
                    log::debug!("FIN timeout; attempt {}", self.control.attempts());
                    self.stats.control_retransmits += 1;
                    out.extend(self.conn.pending_fin());
                }
            }
            _ => {}
        }
        Ok(self.emit(out))
    }

    /// Earliest instant at which [`Initiator::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.conn.phase() {
            Phase::SynSent | Phase::FinWait => self.control.deadline(),
            Phase::Established => self.window.deadline(),
            Phase::Closed => self.linger_until,
            _ => None,
        }
    }

    /// How long the driver may block waiting for input.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        let cap = match self.conn.phase() {
            Phase::Established => self.config.poll_interval,
            Phase::Closed => self.config.linger,
            phase if phase.is_handshake() => self.config.handshake_timeout,
            _ => self.config.teardown_timeout,
        };
        wait_budget(self.next_deadline(), now, cap)
    }
}
