//! Tuning parameters for one transfer.
//!
//! [`TransferConfig`] collects every knob the engines and drivers read:
//! segment size, window, timers, retry bounds and the reliability strategy.
//! The binary fills it from command-line flags; tests build it directly.

use std::time::Duration;

use crate::error::ConnError;
use crate::packet::{DEFAULT_WINDOW, HEADER_LEN};

/// Largest payload that still fits a single UDP datagram with our header.
pub const MAX_MSS: usize = 65_507 - HEADER_LEN;

/// Reliability strategy selected at connection setup.
///
/// All three run on the same state machine, send window and assembler; they
/// differ only in how many bytes may be in flight and whether data is
/// acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReliabilityMode {
    /// Fire-and-forget: data is never acknowledged or retransmitted.
    NoAck,
    /// Stop-and-wait: one segment in flight, each one acknowledged.
    PerPacketAck,
    /// Sliding window with cumulative ACKs and whole-window retransmission.
    #[default]
    GoBackN,
}

impl ReliabilityMode {
    /// Whether the receiver acknowledges data segments.
    pub fn acknowledges_data(self) -> bool {
        !matches!(self, ReliabilityMode::NoAck)
    }

    /// Bytes that may be outstanding at once for the given MSS and window.
    pub fn in_flight_limit(self, mss: usize, window_size: usize) -> usize {
        match self {
            ReliabilityMode::PerPacketAck => mss,
            ReliabilityMode::NoAck | ReliabilityMode::GoBackN => window_size,
        }
    }
}

impl std::fmt::Display for ReliabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReliabilityMode::NoAck => "no-ack",
            ReliabilityMode::PerPacketAck => "per-packet-ack",
            ReliabilityMode::GoBackN => "go-back-n",
        };
        f.write_str(name)
    }
}

/// Adjustable transfer parameters.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum payload bytes per data segment.
    pub mss: usize,
    /// In-flight byte budget for Go-Back-N; a multiple of `mss`.
    pub window_size: usize,
    /// Retransmission timeout for the oldest unacknowledged byte.
    pub retransmit_timeout: Duration,
    /// Receive poll bound during data transfer.
    pub poll_interval: Duration,
    /// SYN retransmission interval and handshake poll bound.
    pub handshake_timeout: Duration,
    /// SYN transmissions before the initiator gives up.
    pub handshake_attempts: u32,
    /// FIN retransmission interval and teardown poll bound.
    pub teardown_timeout: Duration,
    /// FIN transmissions before either side gives up on teardown.
    pub teardown_attempts: u32,
    /// How long the initiator keeps answering a repeated FIN after it has
    /// sent the final ACK.  Should outlast one `teardown_timeout`.
    pub linger: Duration,
    /// Value placed in the window field of outbound segments.
    pub advertised_window: u16,
    pub mode: ReliabilityMode,
    /// Pin the local initial sequence number; random when `None`.
    pub initial_seq: Option<u32>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            mss: 1024,
            window_size: 4096,
            retransmit_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            handshake_timeout: Duration::from_secs(2),
            handshake_attempts: 10,
            teardown_timeout: Duration::from_secs(2),
            teardown_attempts: 5,
            linger: Duration::from_secs(4),
            advertised_window: DEFAULT_WINDOW,
            mode: ReliabilityMode::GoBackN,
            initial_seq: None,
        }
    }
}

impl TransferConfig {
    pub fn with_mode(mut self, mode: ReliabilityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_initial_seq(mut self, isn: u32) -> Self {
        self.initial_seq = Some(isn);
        self
    }

    /// Check the invariants the send window relies on.
    pub fn validate(&self) -> Result<(), ConnError> {
        if self.mss == 0 || self.mss > MAX_MSS {
            return Err(ConnError::InvalidConfig(format!(
                "mss must be in 1..={MAX_MSS}, got {}",
                self.mss
            )));
        }
        if self.window_size < self.mss || self.window_size % self.mss != 0 {
            return Err(ConnError::InvalidConfig(format!(
                "window size {} is not a positive multiple of mss {}",
                self.window_size, self.mss
            )));
        }
        if self.handshake_attempts == 0 || self.teardown_attempts == 0 {
            return Err(ConnError::InvalidConfig(
                "handshake and teardown attempts must be at least 1".into(),
            ));
        }
        if self.retransmit_timeout.is_zero() || self.poll_interval.is_zero() {
            return Err(ConnError::InvalidConfig(
                "retransmit timeout and poll interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        TransferConfig::default().validate().unwrap();
    }

    #[test]
    fn window_must_be_multiple_of_mss() {
        let cfg = TransferConfig {
            window_size: 4000,
            ..TransferConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConnError::InvalidConfig(_))));
    }

    #[test]
    fn zero_mss_rejected() {
        let cfg = TransferConfig {
            mss: 0,
            ..TransferConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn per_packet_ack_limits_flight_to_one_segment() {
        assert_eq!(ReliabilityMode::PerPacketAck.in_flight_limit(512, 4096), 512);
        assert_eq!(ReliabilityMode::GoBackN.in_flight_limit(512, 4096), 4096);
        assert!(!ReliabilityMode::NoAck.acknowledges_data());
    }
}
