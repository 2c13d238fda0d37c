//! Go-Back-N send-side state machine.
//!
//! [`SendWindow`] tracks a sliding window of in-flight **bytes** over a
//! payload that is held in full for the life of the connection.  Nothing is
//! evicted when acknowledged: retransmissions are re-sliced from the
//! original buffer, so a resent segment always reproduces the exact byte
//! range it covered the first time.
//!
//! # Protocol contract
//!
//! - At most `limit` bytes may be unacknowledged at once (the window size
//!   for Go-Back-N, one MSS for per-packet ACK).
//! - ACKs are **cumulative**: `ack = K` means every byte below `K` arrived.
//! - A single timer tracks the oldest unacknowledged byte.  On expiry the
//!   whole range `[base, next_seq)` is sent again (go back N).
//! - Sequence numbers are compared as offsets from `initial_seq`, so the
//!   32-bit space may wrap during a transfer.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::ReliabilityMode;
use crate::error::ConnError;
use crate::packet::Segment;
use crate::timer::RetransmitTimer;

/// Result of feeding an ACK number to [`SendWindow::on_ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `base` moved forward by this many bytes.
    Advanced(usize),
    /// `ack <= base`: nothing new.
    Duplicate,
    /// `ack` lies beyond anything sent; ignored.
    OutOfRange,
}

/// Go-Back-N send-side state for one connection.
///
/// # Sequence-number layout
///
/// ```text
///  initial_seq     base          next_seq              end
///      │             │               │                  │
///  ────┼─────────────┼───────────────┼──────────────────┼──▶ seq space
///      │ <─ acked ─▶ │ <─ in flight ▶│ <─── unsent ───▶ │
/// ```
#[derive(Debug)]
pub struct SendWindow {
    payload: Bytes,
    initial_seq: u32,
    /// Oldest unacknowledged byte (left window edge).
    base: u32,
    /// Next byte to send for the first time.
    next_seq: u32,
    mss: usize,
    /// Maximum bytes in flight.
    limit: usize,
    mode: ReliabilityMode,
    timer: RetransmitTimer,
    window: u16,
}

impl SendWindow {
    /// Create a window over `payload`, whose first byte carries
    /// `initial_seq`.
    ///
    /// Fails when the payload plus the closing FIN would not fit the 32-bit
    /// sequence space.
    pub fn new(
        initial_seq: u32,
        payload: Bytes,
        mss: usize,
        window_size: usize,
        rto: Duration,
        mode: ReliabilityMode,
    ) -> Result<Self, ConnError> {
        if payload.len() >= (u32::MAX / 2) as usize {
            return Err(ConnError::PayloadTooLarge { len: payload.len() });
        }
        debug_assert!(mss > 0 && window_size >= mss);
        Ok(Self {
            payload,
            initial_seq,
            base: initial_seq,
            next_seq: initial_seq,
            mss,
            limit: mode.in_flight_limit(mss, window_size),
            mode,
            timer: RetransmitTimer::new(rto),
            window: crate::packet::DEFAULT_WINDOW,
        })
    }

    /// Override the advertised window placed in data segments.
    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn initial_seq(&self) -> u32 {
        self.initial_seq
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Sequence number one past the last payload byte.
    pub fn end_seq(&self) -> u32 {
        self.initial_seq.wrapping_add(self.payload.len() as u32)
    }

    pub fn total_len(&self) -> usize {
        self.payload.len()
    }

    /// Bytes sent but not yet acknowledged.
    pub fn in_flight(&self) -> usize {
        self.offset(self.next_seq) - self.offset(self.base)
    }

    /// `true` when at least one byte awaits acknowledgement.
    pub fn has_unacked(&self) -> bool {
        self.base != self.next_seq
    }

    /// Every payload byte has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.offset(self.base) == self.payload.len()
    }

    pub fn timer_armed_at(&self) -> Option<Instant> {
        self.timer.armed_at()
    }

    /// When the retransmission timer fires, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    fn offset(&self, seq: u32) -> usize {
        seq.wrapping_sub(self.initial_seq) as usize
    }

    /// Slice `[from, to)` (as offsets) into MSS-sized data segments.
    fn segments(&self, from: usize, to: usize, ack: u32) -> Vec<Segment> {
        let mut out = Vec::with_capacity((to - from).div_ceil(self.mss));
        let mut off = from;
        while off < to {
            let end = (off + self.mss).min(to);
            let mut seg = Segment::data(
                self.initial_seq.wrapping_add(off as u32),
                ack,
                self.payload.slice(off..end),
            );
            seg.window = self.window;
            out.push(seg);
            off = end;
        }
        out
    }

    // -----------------------------------------------------------------------
    // Fill
    // -----------------------------------------------------------------------

    /// Produce the next new data segments the window allows.
    ///
    /// `ack` is the cumulative ACK to piggyback.  Arms the timer when data
    /// enters an empty window.  With [`ReliabilityMode::NoAck`] the bytes
    /// count as done as soon as they are handed out, so each call releases
    /// at most one window's worth.
    pub fn fill(&mut self, ack: u32, now: Instant) -> Vec<Segment> {
        let base = self.offset(self.base);
        let from = self.offset(self.next_seq);
        let to = (base + self.limit).min(self.payload.len());
        if from >= to {
            return Vec::new();
        }

        let segs = self.segments(from, to, ack);
        self.next_seq = self.initial_seq.wrapping_add(to as u32);

        if !self.mode.acknowledges_data() {
            self.base = self.next_seq;
        } else if base == from {
            self.timer.arm(now);
        }
        log::debug!(
            "[gbn] -> {} segment(s) [{}..{}) in_flight={}",
            segs.len(),
            from,
            to,
            self.in_flight()
        );
        segs
    }

    // -----------------------------------------------------------------------
    // Acknowledge
    // -----------------------------------------------------------------------

    /// Process a cumulative ACK.
    ///
    /// Moves `base` to `ack` when `base < ack <= next_seq`, then disarms the
    /// timer if the window drained or re-arms it for the new oldest byte.
    /// Stale and duplicate ACKs never move `base` back and never touch the
    /// timer.
    pub fn on_ack(&mut self, ack: u32, now: Instant) -> AckOutcome {
        if !self.mode.acknowledges_data() {
            return AckOutcome::Duplicate;
        }
        let base = self.offset(self.base);
        let acked = self.offset(ack);
        if acked > self.offset(self.next_seq) {
            // Either beyond what was sent or behind initial_seq (wrapped).
            return if ack.wrapping_sub(self.base) > u32::MAX / 2 {
                AckOutcome::Duplicate
            } else {
                AckOutcome::OutOfRange
            };
        }
        if acked <= base {
            return AckOutcome::Duplicate;
        }

        self.base = ack;
        if self.has_unacked() {
            self.timer.arm(now);
        } else {
            self.timer.disarm();
        }
        AckOutcome::Advanced(acked - base)
    }

    // -----------------------------------------------------------------------
    // Timeout
    // -----------------------------------------------------------------------

    /// If the timer has expired, re-arm it and return every in-flight byte
    /// as fresh MSS-sized segments starting at `base`.  Returns an empty
    /// vector otherwise.
    pub fn on_timer(&mut self, ack: u32, now: Instant) -> Vec<Segment> {
        if !self.timer.expired(now) {
            return Vec::new();
        }
        if !self.has_unacked() {
            self.timer.disarm();
            return Vec::new();
        }
        self.timer.arm(now);
        let segs = self.segments(self.offset(self.base), self.offset(self.next_seq), ack);
        log::debug!(
            "[gbn] timeout: resending {} segment(s) from seq={}",
            segs.len(),
            self.base
        );
        segs
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RTO: Duration = Duration::from_millis(500);

    fn payload(n: usize) -> Bytes {
        Bytes::from((0..n).map(|i| (i % 251) as u8).collect::<Vec<_>>())
    }

    fn gbn(isn: u32, n: usize, mss: usize, window: usize) -> SendWindow {
        SendWindow::new(isn, payload(n), mss, window, RTO, ReliabilityMode::GoBackN).unwrap()
    }

    #[test]
    fn initial_state() {
        let w = gbn(100, 10, 4, 8);
        assert_eq!(w.base(), 100);
        assert_eq!(w.next_seq(), 100);
        assert_eq!(w.end_seq(), 110);
        assert!(!w.has_unacked());
        assert!(!w.is_complete());
        assert_eq!(w.timer_armed_at(), None);
    }

    #[test]
    fn fill_respects_window_and_mss() {
        let now = Instant::now();
        let mut w = gbn(0, 5000, 1024, 4096);
        let segs = w.fill(9, now);
        assert_eq!(segs.len(), 4);
        assert_eq!(
            segs.iter().map(|s| s.seq).collect::<Vec<_>>(),
            vec![0, 1024, 2048, 3072]
        );
        assert!(segs.iter().all(|s| s.payload.len() == 1024 && s.ack == 9 && s.is_ack()));
        assert_eq!(w.next_seq(), 4096);
        assert_eq!(w.in_flight(), 4096);
        assert_eq!(w.timer_armed_at(), Some(now));

        // Window full: nothing more until an ACK arrives.
        assert!(w.fill(9, now).is_empty());
    }

    #[test]
    fn segment_seq_matches_payload_offset() {
        let now = Instant::now();
        let data = payload(3000);
        let mut w =
            SendWindow::new(777, data.clone(), 1000, 3000, RTO, ReliabilityMode::GoBackN).unwrap();
        for seg in w.fill(0, now) {
            let off = (seg.seq - 777) as usize;
            assert_eq!(seg.payload, data.slice(off..off + seg.payload.len()));
        }
    }

    #[test]
    fn last_segment_is_short() {
        let now = Instant::now();
        let mut w = gbn(0, 10, 4, 16);
        let segs = w.fill(0, now);
        assert_eq!(segs.iter().map(|s| s.payload.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(w.next_seq(), w.end_seq());
    }

    #[test]
    fn cumulative_ack_slides_and_rearms() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(10);
        let mut w = gbn(0, 5000, 1024, 4096);
        w.fill(0, t0);

        // ACK covering two segments at once.
        assert_eq!(w.on_ack(2048, t1), AckOutcome::Advanced(2048));
        assert_eq!(w.base(), 2048);
        assert_eq!(w.timer_armed_at(), Some(t1));

        // Room for the tail now.
        let segs = w.fill(0, t1);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].seq, 4096);
        assert_eq!(segs[0].payload.len(), 904);
    }

    #[test]
    fn final_ack_disarms_and_completes() {
        let now = Instant::now();
        let mut w = gbn(10, 8, 4, 8);
        w.fill(0, now);
        assert_eq!(w.on_ack(18, now), AckOutcome::Advanced(8));
        assert!(w.is_complete());
        assert!(!w.has_unacked());
        assert_eq!(w.timer_armed_at(), None);
    }

    #[test]
    fn stale_ack_never_moves_base_back_or_disarms() {
        let t0 = Instant::now();
        let mut w = gbn(0, 4096, 1024, 4096);
        w.fill(0, t0);
        w.on_ack(2048, t0);
        let armed = w.timer_armed_at();

        let later = t0 + Duration::from_millis(50);
        assert_eq!(w.on_ack(2048, later), AckOutcome::Duplicate);
        assert_eq!(w.on_ack(1024, later), AckOutcome::Duplicate);
        assert_eq!(w.on_ack(0, later), AckOutcome::Duplicate);
        assert_eq!(w.base(), 2048);
        assert_eq!(w.timer_armed_at(), armed);
    }

    #[test]
    fn ack_beyond_next_seq_ignored() {
        let now = Instant::now();
        let mut w = gbn(0, 5000, 1024, 2048);
        w.fill(0, now);
        assert_eq!(w.on_ack(4096, now), AckOutcome::OutOfRange);
        assert_eq!(w.base(), 0);
    }

    #[test]
    fn timeout_resends_exact_inflight_range() {
        let t0 = Instant::now();
        let mut w = gbn(0, 5000, 1024, 4096);
        let original = w.fill(0, t0);
        w.on_ack(2048, t0);

        assert!(w.on_timer(0, t0 + RTO / 2).is_empty());

        let fire = t0 + RTO;
        let resent = w.on_timer(0, fire);
        assert_eq!(resent, original[2..].to_vec());
        assert_eq!(w.timer_armed_at(), Some(fire));
        // Fired once; does not fire again until another full timeout.
        assert!(w.on_timer(0, fire + RTO / 2).is_empty());
    }

    #[test]
    fn timeout_after_mid_segment_ack_reslices_from_base() {
        let t0 = Instant::now();
        let data = payload(3000);
        let mut w =
            SendWindow::new(0, data.clone(), 1000, 3000, RTO, ReliabilityMode::GoBackN).unwrap();
        w.fill(0, t0);
        w.on_ack(1500, t0);
        let resent = w.on_timer(0, t0 + RTO);
        assert_eq!(resent.iter().map(|s| s.seq).collect::<Vec<_>>(), vec![1500, 2500]);
        assert_eq!(resent[0].payload, data.slice(1500..2500));
        assert_eq!(resent[1].payload, data.slice(2500..3000));
    }

    #[test]
    fn idle_window_never_times_out() {
        let now = Instant::now();
        let mut w = gbn(0, 100, 10, 20);
        assert!(w.on_timer(0, now + RTO * 10).is_empty());
    }

    #[test]
    fn per_packet_ack_allows_one_segment() {
        let now = Instant::now();
        let mut w =
            SendWindow::new(0, payload(30), 10, 30, RTO, ReliabilityMode::PerPacketAck).unwrap();
        assert_eq!(w.fill(0, now).len(), 1);
        assert!(w.fill(0, now).is_empty());
        w.on_ack(10, now);
        let next = w.fill(0, now);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].seq, 10);
    }

    #[test]
    fn no_ack_releases_one_window_per_fill() {
        let now = Instant::now();
        let mut w = SendWindow::new(0, payload(50), 10, 20, RTO, ReliabilityMode::NoAck).unwrap();
        assert_eq!(w.fill(0, now).len(), 2);
        assert_eq!(w.timer_armed_at(), None);
        assert_eq!(w.fill(0, now).len(), 2);
        assert_eq!(w.fill(0, now).len(), 1);
        assert!(w.is_complete());
        assert!(w.on_timer(0, now + RTO).is_empty());
    }

    #[test]
    fn empty_payload_is_complete_immediately() {
        let now = Instant::now();
        let mut w = gbn(42, 0, 10, 20);
        assert!(w.is_complete());
        assert!(w.fill(0, now).is_empty());
    }

    #[test]
    fn seq_wrap_around() {
        let now = Instant::now();
        let start = u32::MAX - 5;
        let mut w = gbn(start, 20, 8, 32);
        let segs = w.fill(0, now);
        assert_eq!(segs[1].seq, start.wrapping_add(8));
        let end = start.wrapping_add(20);
        assert_eq!(w.on_ack(end, now), AckOutcome::Advanced(20));
        assert!(w.is_complete());
    }
}
