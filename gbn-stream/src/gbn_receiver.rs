//! Go-Back-N receive-side state machine.
//!
//! [`ReceiveAssembler`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** segments are accepted (`seq == expected_seq`).
//! - Out-of-order or duplicate segments are **discarded**, never buffered.
//! - After every data segment (accepted or not) the caller sends a
//!   **cumulative ACK** containing [`ReceiveAssembler::ack_number`], the
//!   single next offset required.
//!
//! In [`ReliabilityMode::NoAck`] nothing is acknowledged, so gaps cannot
//! be repaired; the assembler then delivers anything at or beyond the
//! expected offset and skips over the hole.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use bytes::Bytes;

use crate::config::ReliabilityMode;
use crate::packet::seq_lt;

/// What the assembler did with one data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// In order: these bytes go to the sink.
    Accepted(Bytes),
    /// Entirely below `expected_seq`: already delivered.
    Duplicate,
    /// Beyond `expected_seq`: discarded, the gap stays open.
    Gap,
}

/// Go-Back-N receive-side state for one connection.
#[derive(Debug, Clone)]
pub struct ReceiveAssembler {
    /// Next contiguous byte offset required from the peer.
    expected_seq: u32,
    mode: ReliabilityMode,
}

impl ReceiveAssembler {
    /// `expected_seq` is the first stream byte expected from the peer: the
    /// peer's ISN + 1 after the handshake.
    pub fn new(expected_seq: u32, mode: ReliabilityMode) -> Self {
        Self { expected_seq, mode }
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Cumulative ACK number for the next outbound ACK.
    pub fn ack_number(&self) -> u32 {
        self.expected_seq
    }

    /// Process one inbound data segment.
    pub fn on_segment(&mut self, seq: u32, payload: &Bytes) -> Delivery {
        if seq == self.expected_seq {
            self.expected_seq = self.expected_seq.wrapping_add(payload.len() as u32);
            return Delivery::Accepted(payload.clone());
        }
        if seq_lt(seq, self.expected_seq) {
            return Delivery::Duplicate;
        }
        if !self.mode.acknowledges_data() {
            // No retransmission will ever fill the hole.
            self.expected_seq = seq.wrapping_add(payload.len() as u32);
            return Delivery::Accepted(payload.clone());
        }
        Delivery::Gap
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gbn(expected: u32) -> ReceiveAssembler {
        ReceiveAssembler::new(expected, ReliabilityMode::GoBackN)
    }

    fn b(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[test]
    fn initial_state() {
        let r = gbn(42);
        assert_eq!(r.expected_seq(), 42);
        assert_eq!(r.ack_number(), 42);
    }

    #[test]
    fn in_order_segment_accepted() {
        let mut r = gbn(100);
        assert_eq!(r.on_segment(100, &b(b"hello")), Delivery::Accepted(b(b"hello")));
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn out_of_order_segment_discarded() {
        let mut r = gbn(100);
        assert_eq!(r.on_segment(110, &b(b"future")), Delivery::Gap);
        // Cumulative ACK still advertises 100, not 116.
        assert_eq!(r.ack_number(), 100);
    }

    #[test]
    fn gap_filled_then_retransmission_accepted() {
        let mut r = gbn(0);
        assert_eq!(r.on_segment(5, &b(b"world")), Delivery::Gap);
        assert_eq!(r.ack_number(), 0);
        assert!(matches!(r.on_segment(0, &b(b"hello")), Delivery::Accepted(_)));
        assert_eq!(r.ack_number(), 5);
        // The discarded segment must be resent; nothing was buffered.
        assert!(matches!(r.on_segment(5, &b(b"world")), Delivery::Accepted(_)));
        assert_eq!(r.ack_number(), 10);
    }

    #[test]
    fn duplicate_segment_discarded() {
        let mut r = gbn(100);
        r.on_segment(100, &b(b"hello"));
        assert_eq!(r.on_segment(100, &b(b"hello")), Delivery::Duplicate);
        assert_eq!(r.ack_number(), 105);
    }

    #[test]
    fn sequential_segments_reassemble_source() {
        let source: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let mut r = gbn(1);
        let mut sink = Vec::new();
        for (i, chunk) in source.chunks(1024).enumerate() {
            let seq = 1 + (i * 1024) as u32;
            match r.on_segment(seq, &Bytes::copy_from_slice(chunk)) {
                Delivery::Accepted(bytes) => sink.extend_from_slice(&bytes),
                other => panic!("segment {i} not accepted: {other:?}"),
            }
        }
        assert_eq!(sink, source);
        assert_eq!(r.expected_seq(), 1 + 5000);
    }

    #[test]
    fn no_ack_mode_skips_gaps() {
        let mut r = ReceiveAssembler::new(0, ReliabilityMode::NoAck);
        assert!(matches!(r.on_segment(10, &b(b"late")), Delivery::Accepted(_)));
        assert_eq!(r.expected_seq(), 14);
        assert_eq!(r.on_segment(0, &b(b"0123456789")), Delivery::Duplicate);
    }

    #[test]
    fn seq_wrap_around() {
        let start = u32::MAX - 2;
        let mut r = gbn(start);
        assert!(matches!(r.on_segment(start, &b(b"abcde")), Delivery::Accepted(_)));
        assert_eq!(r.expected_seq(), start.wrapping_add(5));
        assert_eq!(r.on_segment(start, &b(b"abcde")), Delivery::Duplicate);
    }
}
