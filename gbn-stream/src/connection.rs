//! Per-connection lifecycle manager.
//!
//! A [`Connection`] owns the control state of one peer-to-peer session:
//! its [`Phase`], the next local sequence number, the next byte expected
//! from the peer and the peer's address.  It is a pure state machine:
//! [`Connection::advance`] consumes one inbound [`Segment`], pushes any
//! control replies into an outbox and reports what the caller should do
//! with the segment.  Data bytes and cumulative ACKs are *not* interpreted
//! here; they are handed back as [`Disposition::Data`] for the send window
//! or the receive assembler.
//!
//! Segments that make no sense in the current phase are discarded without
//! an error (there is no RST).  Retransmitted control segments are
//! tolerated: a duplicate SYN in `SynReceived` is not re-answered, a
//! duplicate SYN|ACK or FIN is re-acknowledged.

use std::net::SocketAddr;

use crate::config::ReliabilityMode;
use crate::packet::{flags, seq_le, Segment, DEFAULT_WINDOW};
use crate::state::{Phase, Role};
use crate::stats::DropReason;

/// What happened to a segment passed to [`Connection::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Consumed by the state machine (handshake/teardown progress or a
    /// tolerated duplicate).
    Consumed,
    /// Data-phase segment: payload for the assembler (responder) or a
    /// cumulative ACK for the send window (initiator).
    Data,
    /// The peer's FIN was accepted; no more stream bytes will arrive.
    PeerFinished,
    /// Teardown finished; the connection is closed.
    Closed,
    /// Discarded.
    Ignored(DropReason),
}

/// Control state for one side of a connection.
#[derive(Debug, Clone)]
pub struct Connection {
    role: Role,
    mode: ReliabilityMode,
    phase: Phase,
    /// Next sequence number this side will originate.
    local_seq: u32,
    /// Next byte offset expected from the peer; placed in outgoing `ack`.
    remote_seq_expected: u32,
    peer: Option<SocketAddr>,
    window: u16,
    /// Initiator teardown progress.
    fin_acked: bool,
    peer_fin: bool,
}

impl Connection {
    /// Active side.  Starts in [`Phase::SynSent`]; call [`Connection::syn`]
    /// for the segment to transmit.
    pub fn initiator(isn: u32, peer: SocketAddr, mode: ReliabilityMode) -> Self {
        Self::new(Role::Initiator, Phase::SynSent, isn, Some(peer), mode)
    }

    /// Passive side.  Starts in [`Phase::Listen`] and adopts the address of
    /// the first SYN as its peer.
    pub fn responder(isn: u32, mode: ReliabilityMode) -> Self {
        Self::new(Role::Responder, Phase::Listen, isn, None, mode)
    }

    fn new(
        role: Role,
        phase: Phase,
        isn: u32,
        peer: Option<SocketAddr>,
        mode: ReliabilityMode,
    ) -> Self {
        Self {
            role,
            mode,
            phase,
            local_seq: isn,
            remote_seq_expected: 0,
            peer,
            window: DEFAULT_WINDOW,
            fin_acked: false,
            peer_fin: false,
        }
    }

    /// Override the advertised window placed in outgoing segments.
    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn local_seq(&self) -> u32 {
        self.local_seq
    }

    pub fn remote_seq_expected(&self) -> u32 {
        self.remote_seq_expected
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Record that stream bytes up to `seq` have been accepted from the peer.
    pub fn set_remote_seq_expected(&mut self, seq: u32) {
        self.remote_seq_expected = seq;
    }

    // -----------------------------------------------------------------------
    // Outbound control segments
    // -----------------------------------------------------------------------

    fn control(&self, seq: u32, flags: u8) -> Segment {
        let mut seg = Segment::control(seq, self.remote_seq_expected, flags);
        seg.window = self.window;
        seg
    }

    /// The initiator's SYN.  Re-sent unchanged until a SYN|ACK arrives.
    pub fn syn(&self) -> Segment {
        let mut seg = Segment::control(self.local_seq, 0, flags::SYN);
        seg.window = self.window;
        seg
    }

    /// A bare cumulative ACK reflecting the current state.
    pub fn ack(&self) -> Segment {
        self.control(self.local_seq, flags::ACK)
    }

    /// Initiator: every byte is acknowledged; send FIN at `fin_seq` (the
    /// highest sent sequence number) and enter [`Phase::FinWait`].
    pub fn begin_close(&mut self, fin_seq: u32) -> Segment {
        self.local_seq = fin_seq;
        let fin = self.control(self.local_seq, flags::FIN | flags::ACK);
        self.local_seq = self.local_seq.wrapping_add(1);
        self.fin_acked = false;
        self.peer_fin = false;
        self.set_phase(Phase::FinWait);
        fin
    }

    /// The FIN this side already sent, for retransmission during teardown.
    pub fn pending_fin(&self) -> Option<Segment> {
        self.phase
            .is_teardown()
            .then(|| self.control(self.local_seq.wrapping_sub(1), flags::FIN | flags::ACK))
    }

    fn set_phase(&mut self, next: Phase) {
        if self.phase != next {
            log::debug!("{:?}: {} -> {}", self.role, self.phase, next);
            self.phase = next;
        }
    }

    fn unexpected(&self) -> Disposition {
        Disposition::Ignored(DropReason::UnexpectedForPhase(self.phase))
    }

    // -----------------------------------------------------------------------
    // Inbound transitions
    // -----------------------------------------------------------------------

    /// Feed one inbound segment from `from` through the state machine.
    ///
    /// Control replies are appended to `out` in transmission order.
    pub fn advance(
        &mut self,
        seg: &Segment,
        from: SocketAddr,
        out: &mut Vec<Segment>,
    ) -> Disposition {
        if self.peer.is_some_and(|peer| peer != from) {
            return Disposition::Ignored(DropReason::ForeignPeer);
        }

        match (self.role, self.phase) {
            (Role::Responder, Phase::Listen) => self.on_listen(seg, from, out),
            (Role::Responder, Phase::SynReceived) => self.on_syn_received(seg, out),
            (Role::Responder, Phase::Established) => self.on_responder_established(seg, out),
            (Role::Responder, Phase::LastAck) => self.on_last_ack(seg, out),
            (Role::Initiator, Phase::SynSent) => self.on_syn_sent(seg, out),
            (Role::Initiator, Phase::Established) => self.on_initiator_established(seg, out),
            (Role::Initiator, Phase::FinWait) => self.on_fin_wait(seg, out),
            (Role::Initiator, Phase::Closed) => self.on_initiator_closed(seg, out),
            _ => self.unexpected(),
        }
    }

    fn on_listen(
        &mut self,
        seg: &Segment,
        from: SocketAddr,
        out: &mut Vec<Segment>,
    ) -> Disposition {
        if !seg.is_syn() || seg.is_ack() || seg.is_fin() {
            return self.unexpected();
        }
        self.peer = Some(from);
        self.remote_seq_expected = seg.seq.wrapping_add(1);
        out.push(self.control(self.local_seq, flags::SYN | flags::ACK));
        self.local_seq = self.local_seq.wrapping_add(1);
        self.set_phase(Phase::SynReceived);
        Disposition::Consumed
    }

    fn on_syn_received(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if seg.is_syn() && !seg.is_ack() {
            // Retransmitted SYN: tolerated, not re-answered.
            return if seg.seq.wrapping_add(1) == self.remote_seq_expected {
                Disposition::Ignored(DropReason::Duplicate)
            } else {
                self.unexpected()
            };
        }
        if !seg.is_ack() || seg.ack != self.local_seq {
            return self.unexpected();
        }
        self.set_phase(Phase::Established);
        if seg.has_data() || seg.is_fin() {
            // The bare ACK was lost but the peer has already moved on.
            return self.on_responder_established(seg, out);
        }
        Disposition::Consumed
    }

    fn on_responder_established(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if seg.is_fin() {
            let in_order = if self.mode.acknowledges_data() {
                seg.seq == self.remote_seq_expected
            } else {
                seq_le(self.remote_seq_expected, seg.seq)
            };
            if !in_order {
                // Stream bytes are still missing; repeat the current ack.
                out.push(self.ack());
                return self.unexpected();
            }
            self.remote_seq_expected = seg.seq.wrapping_add(1);
            out.push(self.ack());
            out.push(self.control(self.local_seq, flags::FIN | flags::ACK));
            self.local_seq = self.local_seq.wrapping_add(1);
            self.set_phase(Phase::LastAck);
            return Disposition::PeerFinished;
        }
        if seg.has_data() {
            return Disposition::Data;
        }
        if seg.is_syn() {
            return Disposition::Ignored(DropReason::Duplicate);
        }
        if seg.is_ack() {
            // Duplicate handshake ACK.
            return Disposition::Consumed;
        }
        self.unexpected()
    }

    fn on_last_ack(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if seg.is_fin() && seg.seq.wrapping_add(1) == self.remote_seq_expected {
            // Our ACK or FIN was lost; answer the retransmitted FIN again.
            out.push(self.control(self.local_seq.wrapping_sub(1), flags::ACK));
            out.extend(self.pending_fin());
            return Disposition::Consumed;
        }
        if seg.is_ack() && seg.ack == self.local_seq {
            self.set_phase(Phase::Closed);
            return Disposition::Closed;
        }
        self.unexpected()
    }

    fn on_syn_sent(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if !(seg.is_syn() && seg.is_ack()) || seg.ack != self.local_seq.wrapping_add(1) {
            return self.unexpected();
        }
        self.local_seq = self.local_seq.wrapping_add(1);
        self.remote_seq_expected = seg.seq.wrapping_add(1);
        out.push(self.ack());
        self.set_phase(Phase::Established);
        Disposition::Consumed
    }

    fn on_initiator_established(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if seg.is_syn() && seg.is_ack() {
            if seg.seq.wrapping_add(1) == self.remote_seq_expected {
                // Our handshake ACK was lost; confirm again.
                out.push(self.ack());
                return Disposition::Consumed;
            }
            return self.unexpected();
        }
        if seg.is_ack() && !seg.is_syn() && !seg.is_fin() {
            return Disposition::Data;
        }
        self.unexpected()
    }

    fn on_fin_wait(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        let mut progressed = false;

        if seg.is_ack() && seg.ack == self.local_seq && !self.fin_acked {
            self.fin_acked = true;
            progressed = true;
        }
        if seg.is_fin() {
            if seg.seq == self.remote_seq_expected && !self.peer_fin {
                self.remote_seq_expected = self.remote_seq_expected.wrapping_add(1);
                self.peer_fin = true;
                progressed = true;
            } else if self.peer_fin && seg.seq.wrapping_add(1) == self.remote_seq_expected {
                progressed = true;
            }
        }

        if self.fin_acked && self.peer_fin {
            out.push(self.ack());
            self.set_phase(Phase::Closed);
            return Disposition::Closed;
        }
        if progressed {
            Disposition::Consumed
        } else {
            self.unexpected()
        }
    }

    /// The final ACK was lost and the peer is retrying its FIN.
    fn on_initiator_closed(&mut self, seg: &Segment, out: &mut Vec<Segment>) -> Disposition {
        if self.peer_fin && seg.is_fin() && seg.seq.wrapping_add(1) == self.remote_seq_expected {
            out.push(self.ack());
            return Disposition::Consumed;
        }
        self.unexpected()
    }
}
