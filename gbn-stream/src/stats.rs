//! Counters for everything the protocol tolerates silently.
//!
//! Stray, malformed and out-of-order segments never produce errors; they
//! are tallied here and logged at `debug`/`trace` level so a caller can
//! observe them without the engines printing anything themselves.

use crate::state::Phase;

/// Why an inbound segment was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Shorter than the fixed header.
    Malformed,
    /// Came from an address other than the connected peer.
    ForeignPeer,
    /// Not acceptable in the phase the connection was in.
    UnexpectedForPhase(Phase),
    /// Already-seen control segment (e.g. a retransmitted SYN).
    Duplicate,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Malformed => f.write_str("malformed"),
            DropReason::ForeignPeer => f.write_str("foreign peer"),
            DropReason::UnexpectedForPhase(p) => write!(f, "unexpected in {p}"),
            DropReason::Duplicate => f.write_str("duplicate control"),
        }
    }
}

/// Per-connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub segments_sent: u64,
    pub segments_received: u64,
    /// First transmissions of data segments.
    pub data_segments_sent: u64,
    /// Timeouts that triggered a Go-Back-N resend.
    pub retransmit_rounds: u64,
    /// Data segments sent again by those rounds.
    pub retransmitted_segments: u64,
    /// SYN or FIN transmissions after the first.
    pub control_retransmits: u64,
    /// Data segments that arrived in order and were delivered.
    pub accepted_segments: u64,
    /// Data segments below the expected offset.
    pub duplicate_segments: u64,
    /// Data segments beyond the expected offset (discarded).
    pub out_of_order_segments: u64,
    pub bytes_delivered: u64,
    pub dropped_malformed: u64,
    pub dropped_foreign: u64,
    pub dropped_unexpected: u64,
    pub dropped_duplicate_control: u64,
}

impl Stats {
    pub fn record_drop(&mut self, reason: DropReason) {
        log::trace!("dropped segment: {reason}");
        match reason {
            DropReason::Malformed => self.dropped_malformed += 1,
            DropReason::ForeignPeer => self.dropped_foreign += 1,
            DropReason::UnexpectedForPhase(_) => self.dropped_unexpected += 1,
            DropReason::Duplicate => self.dropped_duplicate_control += 1,
        }
    }

    /// Total segments discarded for any reason.
    pub fn dropped(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_foreign
            + self.dropped_unexpected
            + self.dropped_duplicate_control
    }
}
