//! Errors surfaced to callers of the drivers and engines.
//!
//! Only unrecoverable conditions appear here.  Poll timeouts, duplicates,
//! gaps, malformed and out-of-phase segments are handled inside the engines
//! and show up in [`crate::stats::Stats`] instead.

use thiserror::Error;

use crate::state::Phase;

#[derive(Debug, Error)]
pub enum ConnError {
    /// The datagram transport failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing received bytes to the payload sink failed.
    #[error("payload sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// No SYN|ACK arrived after the configured number of SYNs.
    #[error("handshake not completed after {attempts} SYN attempts")]
    HandshakeFailed { attempts: u32 },

    /// Teardown retries ran out; the connection is abandoned in `phase`.
    #[error("teardown not completed after {attempts} FIN attempts (stuck in {phase})")]
    TeardownExhausted { phase: Phase, attempts: u32 },

    /// The payload does not fit the 32-bit sequence space.
    #[error("payload of {len} bytes does not fit the sequence space")]
    PayloadTooLarge { len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
